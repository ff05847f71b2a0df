use crate::backend::BookingStore;
use crate::configuration::Configuration;
use crate::dedup::DedupCache;
use crate::mailer::Mailer;
use crate::normalizer::BookingDefaults;
use crate::notifications::NotificationSettings;
use crate::vendor::{default_assets, VendorAssets};
use crate::voice_sessions::VoiceSessions;
use std::{path::PathBuf, sync::Arc};

pub struct Settings {
    pub defaults: BookingDefaults,
    pub notifications: NotificationSettings,
    pub static_dir: PathBuf,
}

/// Everything a handler needs, built once at startup and shared by clone.
#[derive(Clone)]
pub struct AppState<S: BookingStore, M: Mailer> {
    pub store: S,
    pub mailer: M,
    pub dedup: DedupCache,
    pub vendor: VendorAssets,
    pub voice: VoiceSessions,
    pub settings: Arc<Settings>,
}

impl<S: BookingStore, M: Mailer> AppState<S, M> {
    pub fn new(store: S, mailer: M, configuration: &Configuration) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            mailer,
            dedup: DedupCache::new(configuration.dedup_ttl()),
            vendor: VendorAssets::new(configuration.vendor_cache_dir.clone(), default_assets())?,
            voice: VoiceSessions::new(configuration.voice_settings())?,
            settings: Arc::new(Settings {
                defaults: configuration.booking_defaults(),
                notifications: configuration.notification_settings(),
                static_dir: configuration.static_dir.clone(),
            }),
        })
    }
}
