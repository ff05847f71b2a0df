use crate::calendar::CalendarInvite;
use crate::mailer::{Mailer, OutgoingEmail};
use crate::normalizer::BookingRequest;
use crate::timezone::{local_datetime, parse_zone, to_iso};
use crate::types::Outcome;
use chrono::{DateTime, Utc};
use futures::future::join;
use tracing::{error, info};

#[derive(Debug, Clone, Default)]
pub struct NotificationSettings {
    pub from_email: Option<String>,
    pub sales_email: Option<String>,
    pub brand_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationReport {
    pub sales_alert: Outcome,
    pub confirmation: Outcome,
}

/// Sends the internal sales alert and the submitter confirmation. The two
/// sends run concurrently and neither failure affects the other.
pub async fn dispatch<M: Mailer>(
    mailer: &M,
    settings: &NotificationSettings,
    booking: &BookingRequest,
    start_utc: Option<DateTime<Utc>>,
) -> NotificationReport {
    let alert_send = async {
        match sales_alert(settings, booking, start_utc) {
            Some(email) => deliver(mailer, email, "sales alert").await,
            None => Outcome::Skipped("no sales address configured".into()),
        }
    };
    let confirmation_send = deliver(mailer, confirmation(settings, booking), "confirmation");

    let (sales_alert, confirmation) = join(alert_send, confirmation_send).await;
    NotificationReport {
        sales_alert,
        confirmation,
    }
}

async fn deliver<M: Mailer>(mailer: &M, email: OutgoingEmail, kind: &'static str) -> Outcome {
    let to = email.to.clone();
    match mailer.send(email).await {
        Ok(()) => {
            info!(kind, to = %to, "Email sent");
            Outcome::Done
        }
        Err(err) => {
            error!(kind, to = %to, %err, "Failed to send email");
            Outcome::Failed(err.to_string())
        }
    }
}

pub fn sales_alert(
    settings: &NotificationSettings,
    booking: &BookingRequest,
    start_utc: Option<DateTime<Utc>>,
) -> Option<OutgoingEmail> {
    let to = settings.sales_email.clone()?;
    let subject = match &booking.company {
        Some(company) => format!("New booking request: {} ({company})", booking.full_name),
        None => format!("New booking request: {}", booking.full_name),
    };

    let mut body = String::from("New booking request\n\n");
    body.push_str(&format!("Name: {}\n", booking.full_name));
    body.push_str(&format!("Email: {}\n", booking.email));
    body.push_str(&format!("Phone: {}\n", or_dash(&booking.phone)));
    body.push_str(&format!("Company: {}\n", or_dash(&booking.company)));
    if has_schedule(booking) {
        body.push_str(&format!(
            "Requested: {} {} ({}), {} minutes\n",
            booking.date, booking.time, booking.time_zone, booking.duration_minutes
        ));
        body.push_str(&format!(
            "UTC start: {}\n",
            start_utc
                .as_ref()
                .map(to_iso)
                .unwrap_or_else(|| "not available".into())
        ));
    } else {
        body.push_str("Requested: no time given\n");
    }
    body.push_str(&format!("Source: {}\n", booking.source));
    body.push_str(&format!("Notes: {}\n", or_dash(&booking.notes)));

    Some(OutgoingEmail {
        to,
        reply_to: Some(booking.email.clone()),
        subject,
        body,
        invite: None,
    })
}

pub fn confirmation(settings: &NotificationSettings, booking: &BookingRequest) -> OutgoingEmail {
    let brand = &settings.brand_name;
    let mut body = format!("Hi {},\n\nThanks for reaching out to {brand}. ", booking.full_name);
    if has_schedule(booking) {
        body.push_str(&format!(
            "We received your request for a call on {} at {} ({}). \
             A calendar invite is attached where available; we will confirm shortly.\n",
            booking.date, booking.time, booking.time_zone
        ));
    } else {
        body.push_str("We received your request and will get in touch shortly to find a time.\n");
    }
    body.push_str(&format!("\nBest regards,\n{brand}\n"));

    OutgoingEmail {
        to: booking.email.clone(),
        reply_to: settings.sales_email.clone(),
        subject: format!("{brand}: we received your request"),
        body,
        invite: invite(settings, booking),
    }
}

/// Only built when the wall time and zone are usable and an organizer address
/// is known.
pub fn invite(settings: &NotificationSettings, booking: &BookingRequest) -> Option<CalendarInvite> {
    let start = local_datetime(&booking.date, &booking.time)?;
    parse_zone(&booking.time_zone)?;
    let organizer = settings
        .from_email
        .as_ref()
        .or(settings.sales_email.as_ref())?;

    CalendarInvite::new(
        start,
        booking.duration_minutes,
        booking.time_zone.trim(),
        &format!("{} call with {}", settings.brand_name, booking.full_name),
        booking.notes.as_deref().unwrap_or_default(),
        organizer,
        &booking.full_name,
        &booking.email,
    )
}

fn has_schedule(booking: &BookingRequest) -> bool {
    !booking.date.is_empty() && !booking.time.is_empty()
}

fn or_dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutils::MockMailer;
    use std::sync::atomic::Ordering;

    fn settings() -> NotificationSettings {
        NotificationSettings {
            from_email: Some("bookings@example.com".into()),
            sales_email: Some("sales@example.com".into()),
            brand_name: "Acme".into(),
        }
    }

    fn booking() -> BookingRequest {
        BookingRequest {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: None,
            company: Some("Analytical Engines".into()),
            date: "2024-07-04".into(),
            time: "14:30".into(),
            time_zone: "America/New_York".into(),
            duration_minutes: 30,
            notes: Some("Pricing questions".into()),
            source: "pricing".into(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_sends_two_emails() {
        let mailer = MockMailer::new();
        let report = dispatch(&mailer, &settings(), &booking(), None).await;

        assert_eq!(report.sales_alert, Outcome::Done);
        assert_eq!(report.confirmation, Outcome::Done);
        assert_eq!(mailer.0.calls_to_send.load(Ordering::SeqCst), 2);

        let sent = mailer.sent();
        let alert = sent.iter().find(|e| e.to == "sales@example.com").unwrap();
        assert_eq!(alert.reply_to.as_deref(), Some("ada@example.com"));
        assert!(alert.body.contains("Company: Analytical Engines"));
        let confirmation = sent.iter().find(|e| e.to == "ada@example.com").unwrap();
        assert!(confirmation.invite.is_some());
    }

    #[tokio::test]
    async fn test_failed_alert_does_not_block_confirmation() {
        let mailer = MockMailer::new();
        mailer.fail_for("sales@example.com");

        let report = dispatch(&mailer, &settings(), &booking(), None).await;

        assert!(matches!(report.sales_alert, Outcome::Failed(_)));
        assert_eq!(report.confirmation, Outcome::Done);
        assert_eq!(mailer.0.calls_to_send.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_sales_address_skips_alert() {
        let mailer = MockMailer::new();
        let settings = NotificationSettings {
            sales_email: None,
            ..settings()
        };

        let report = dispatch(&mailer, &settings, &booking(), None).await;

        assert!(matches!(report.sales_alert, Outcome::Skipped(_)));
        assert_eq!(report.confirmation, Outcome::Done);
        assert_eq!(mailer.0.calls_to_send.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_alert_mentions_utc_start() {
        let start = crate::timezone::zoned_to_utc("2024-07-04", "14:30", "America/New_York");
        let alert = sales_alert(&settings(), &booking(), start).unwrap();
        assert!(alert.body.contains("UTC start: 2024-07-04T18:30:00.000Z"));
        assert!(alert.subject.contains("(Analytical Engines)"));
    }

    #[test]
    fn test_no_invite_without_usable_time() {
        let mut unscheduled = booking();
        unscheduled.time = "whenever".into();
        assert!(invite(&settings(), &unscheduled).is_none());

        let mut bad_zone = booking();
        bad_zone.time_zone = "Nowhere/Special".into();
        assert!(invite(&settings(), &bad_zone).is_none());

        let confirmation = confirmation(&settings(), &unscheduled);
        assert!(confirmation.invite.is_none());
    }

    #[test]
    fn test_invite_uses_local_wall_time() {
        let invite = invite(&settings(), &booking()).unwrap();
        assert_eq!(invite.time_zone, "America/New_York");
        assert_eq!(invite.start.format("%H:%M").to_string(), "14:30");
        assert_eq!(invite.organizer, "bookings@example.com");
    }
}
