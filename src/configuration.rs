use crate::mailer::SmtpSettings;
use crate::normalizer::BookingDefaults;
use crate::notifications::NotificationSettings;
use crate::voice_sessions::VoiceSettings;
use clap::Parser;
use std::{path::PathBuf, time::Duration};

/// Every option can also be given through the environment (or a `.env` file).
#[derive(Parser, Clone)]
#[command(version, about = "Marketing site backend: static site, booking intake and vendor proxies")]
pub struct Configuration {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Postgres connection string. Bookings are kept in memory when unset.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "STATIC_DIR", default_value = "public")]
    pub static_dir: PathBuf,

    #[arg(long, env = "VENDOR_CACHE_DIR", default_value = ".vendor-cache")]
    pub vendor_cache_dir: PathBuf,

    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASS", hide_env_values = true)]
    pub smtp_pass: Option<String>,

    /// Implicit TLS instead of STARTTLS.
    #[arg(
        long,
        env = "SMTP_SECURE",
        default_value_t = false,
        action = clap::ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub smtp_secure: bool,

    #[arg(long, env = "FROM_EMAIL")]
    pub from_email: Option<String>,

    #[arg(long, env = "SALES_EMAIL")]
    pub sales_email: Option<String>,

    #[arg(long, env = "BRAND_NAME", default_value = "Our team")]
    pub brand_name: String,

    #[arg(long, env = "RETELL_API_KEY", hide_env_values = true)]
    pub retell_api_key: Option<String>,

    #[arg(long, env = "RETELL_AGENT_ID")]
    pub retell_agent_id: Option<String>,

    #[arg(long, env = "RETELL_BASE_URL", default_value = "https://api.retellai.com")]
    pub retell_base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_REALTIME_MODEL", default_value = "gpt-4o-realtime-preview")]
    pub openai_realtime_model: String,

    #[arg(long, env = "OPENAI_REALTIME_VOICE", default_value = "alloy")]
    pub openai_realtime_voice: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    pub openai_base_url: String,

    /// Window in which an identical booking is treated as a repeat.
    #[arg(long, env = "BOOKING_DEDUP_TTL_SECONDS", default_value_t = 120)]
    pub booking_dedup_ttl_seconds: u64,

    #[arg(long, env = "DEFAULT_TIME_ZONE", default_value = "UTC")]
    pub default_time_zone: String,

    #[arg(long, env = "DEFAULT_DURATION_MINUTES", default_value_t = 30)]
    pub default_duration_minutes: i32,
}

impl Configuration {
    pub fn parse_arguments() -> Self {
        // A missing .env file is fine, the real environment still applies.
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    pub fn address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.booking_dedup_ttl_seconds)
    }

    pub fn booking_defaults(&self) -> BookingDefaults {
        BookingDefaults {
            time_zone: self.default_time_zone.clone(),
            duration_minutes: self.default_duration_minutes.max(1),
        }
    }

    pub fn smtp_settings(&self) -> SmtpSettings {
        SmtpSettings {
            host: non_empty(&self.smtp_host),
            port: self.smtp_port,
            user: non_empty(&self.smtp_user),
            pass: non_empty(&self.smtp_pass),
            secure: self.smtp_secure,
            from: non_empty(&self.from_email),
        }
    }

    pub fn notification_settings(&self) -> NotificationSettings {
        NotificationSettings {
            from_email: non_empty(&self.from_email),
            sales_email: non_empty(&self.sales_email),
            brand_name: self.brand_name.clone(),
        }
    }

    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            retell_api_key: non_empty(&self.retell_api_key),
            retell_agent_id: non_empty(&self.retell_agent_id),
            retell_base_url: self.retell_base_url.clone(),
            openai_api_key: non_empty(&self.openai_api_key),
            openai_model: self.openai_realtime_model.clone(),
            openai_voice: self.openai_realtime_voice.clone(),
            openai_base_url: self.openai_base_url.clone(),
        }
    }
}

// Deployments often export empty variables instead of leaving them unset.
fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}
