use crate::calendar::CalendarInvite;
use lettre::{
    message::{
        header::{ContentType, ContentTypeErr},
        Attachment, Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::future::Future;
use thiserror::Error;
use tracing::warn;

const INVITE_FILE_NAME: &str = "invite.ics";
const INVITE_CONTENT_TYPE: &str = "text/calendar; method=REQUEST; charset=UTF-8";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport is not configured")]
    NotConfigured,

    #[error("Invalid mail address: {0}")]
    Address(String),

    #[error("Invalid content type: {0}")]
    ContentType(#[from] ContentTypeErr),

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("SMTP server did not accept the connection")]
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
    pub invite: Option<CalendarInvite>,
}

pub trait Mailer: Clone + Send + Sync + 'static {
    fn send(&self, email: OutgoingEmail) -> impl Future<Output = Result<(), MailError>> + Send;
    fn verify(&self) -> impl Future<Output = Result<(), MailError>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct SmtpSettings {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    /// Implicit TLS when set, STARTTLS otherwise.
    pub secure: bool,
    pub from: Option<String>,
}

/// Pooled SMTP transport shared by every request.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let from = settings.from.as_deref().map(parse_mailbox).transpose()?;
        let transport = match settings.host.as_deref() {
            Some(host) => Some(build_transport(host, settings)?),
            None => None,
        };
        Ok(Self { transport, from })
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some() && self.from.is_some()
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, MailError> {
        let from = self.from.clone().ok_or(MailError::NotConfigured)?;
        let mut builder = Message::builder()
            .from(from)
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone());

        if let Some(reply_to) = &email.reply_to {
            match parse_mailbox(reply_to) {
                Ok(mailbox) => builder = builder.reply_to(mailbox),
                Err(err) => warn!(?err, "Dropping unusable reply-to address"),
            }
        }

        let text = SinglePart::plain(email.body.clone());
        let message = match &email.invite {
            Some(invite) => builder.multipart(
                MultiPart::mixed().singlepart(text).singlepart(
                    Attachment::new(INVITE_FILE_NAME.into())
                        .body(invite.render(), ContentType::parse(INVITE_CONTENT_TYPE)?),
                ),
            )?,
            None => builder.singlepart(text)?,
        };
        Ok(message)
    }
}

impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let transport = self.transport.as_ref().ok_or(MailError::NotConfigured)?;
        let message = self.build_message(&email)?;
        transport.send(message).await?;
        Ok(())
    }

    async fn verify(&self) -> Result<(), MailError> {
        let transport = self.transport.as_ref().ok_or(MailError::NotConfigured)?;
        match transport.test_connection().await? {
            true => Ok(()),
            false => Err(MailError::Rejected),
        }
    }
}

fn build_transport(
    host: &str,
    settings: &SmtpSettings,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
    let builder = if settings.secure {
        AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
    };
    let mut builder = builder.port(settings.port);
    if let (Some(user), Some(pass)) = (&settings.user, &settings.pass) {
        builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }
    Ok(builder.build())
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|_| MailError::Address(address.into()))
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    fn configured() -> SmtpMailer {
        SmtpMailer::new(&SmtpSettings {
            host: Some("smtp.example.com".into()),
            port: 587,
            from: Some("Bookings <bookings@example.com>".into()),
            ..SmtpSettings::default()
        })
        .unwrap()
    }

    fn email(invite: Option<CalendarInvite>) -> OutgoingEmail {
        OutgoingEmail {
            to: "ada@example.com".into(),
            reply_to: Some("not an address".into()),
            subject: "We received your request".into(),
            body: "Thanks!".into(),
            invite,
        }
    }

    #[test]
    fn test_unconfigured_mailer() {
        let mailer = SmtpMailer::new(&SmtpSettings::default()).unwrap();
        assert!(!mailer.is_configured());
        assert!(matches!(
            mailer.build_message(&email(None)),
            Err(MailError::NotConfigured)
        ));
    }

    #[test]
    fn test_invalid_from_is_rejected() {
        let result = SmtpMailer::new(&SmtpSettings {
            from: Some("no at sign".into()),
            ..SmtpSettings::default()
        });
        assert!(matches!(result, Err(MailError::Address(_))));
    }

    #[tokio::test]
    async fn test_message_with_invite_attachment() {
        let start = NaiveDate::from_ymd_opt(2024, 7, 4)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let invite = CalendarInvite::new(
            start,
            30,
            "America/New_York",
            "Demo",
            "",
            "bookings@example.com",
            "Ada",
            "ada@example.com",
        )
        .unwrap();
        let mailer = configured();
        assert!(mailer.is_configured());

        let message = mailer.build_message(&email(Some(invite))).unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("invite.ics"));
        assert!(formatted.contains("text/calendar"));
        assert!(formatted.contains("To: ada@example.com"));
        // An unusable reply-to is dropped rather than failing the send.
        assert!(!formatted.contains("Reply-To"));
    }

    #[tokio::test]
    async fn test_send_without_transport_fails_fast() {
        let mailer = SmtpMailer::new(&SmtpSettings {
            from: Some("bookings@example.com".into()),
            ..SmtpSettings::default()
        })
        .unwrap();
        assert!(matches!(
            mailer.send(email(None)).await,
            Err(MailError::NotConfigured)
        ));
        assert!(matches!(mailer.verify().await, Err(MailError::NotConfigured)));
    }
}
