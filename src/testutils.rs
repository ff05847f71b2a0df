use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::Router;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    backend::{BookingStore, StoreError},
    dedup::DedupCache,
    http::create_app,
    mailer::{MailError, Mailer, OutgoingEmail},
    normalizer::BookingDefaults,
    notifications::NotificationSettings,
    state::{AppState, Settings},
    types::{NewBooking, StoreInfo},
    vendor::VendorAssets,
    voice_sessions::{VoiceSessions, VoiceSettings},
};

pub struct MockBookingStoreInner {
    pub success: AtomicBool,
    pub calls_to_ensure_schema: AtomicU64,
    pub calls_to_insert_booking: AtomicU64,
    pub calls_to_info: AtomicU64,
    pub bookings: Mutex<Vec<NewBooking>>,
}

#[derive(Clone)]
pub struct MockBookingStore(pub Arc<MockBookingStoreInner>);

impl MockBookingStoreInner {
    fn new() -> Self {
        Self {
            success: AtomicBool::new(true),
            calls_to_ensure_schema: AtomicU64::default(),
            calls_to_insert_booking: AtomicU64::default(),
            calls_to_info: AtomicU64::default(),
            bookings: Mutex::default(),
        }
    }
}

impl MockBookingStore {
    pub fn new() -> Self {
        Self(Arc::new(MockBookingStoreInner::new()))
    }

    pub fn inserted(&self) -> Vec<NewBooking> {
        self.0.bookings.lock().unwrap().clone()
    }

    fn result(&self) -> Result<(), StoreError> {
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(StoreError::Task("Supposed to fail".into())),
        }
    }
}

impl BookingStore for MockBookingStore {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.0.calls_to_ensure_schema.fetch_add(1, Ordering::SeqCst);
        self.result()
    }

    fn insert_booking(&self, booking: &NewBooking) -> Result<i32, StoreError> {
        self.0.calls_to_insert_booking.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        let mut bookings = self.0.bookings.lock().unwrap();
        bookings.push(booking.clone());
        Ok(bookings.len() as i32)
    }

    fn info(&self) -> Result<StoreInfo, StoreError> {
        self.0.calls_to_info.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(StoreInfo {
            backend: "mock".into(),
            table_exists: true,
            columns: vec!["id".into(), "full_name".into(), "email".into()],
            row_count: self.0.bookings.lock().unwrap().len() as i64,
        })
    }
}

pub struct MockMailerInner {
    pub success: AtomicBool,
    pub calls_to_send: AtomicU64,
    pub calls_to_verify: AtomicU64,
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub failing: Mutex<HashSet<String>>,
}

#[derive(Clone)]
pub struct MockMailer(pub Arc<MockMailerInner>);

impl MockMailer {
    pub fn new() -> Self {
        Self(Arc::new(MockMailerInner {
            success: AtomicBool::new(true),
            calls_to_send: AtomicU64::default(),
            calls_to_verify: AtomicU64::default(),
            sent: Mutex::default(),
            failing: Mutex::default(),
        }))
    }

    /// Every attempted send, including the failed ones.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.0.sent.lock().unwrap().clone()
    }

    pub fn fail_for(&self, address: &str) {
        self.0.failing.lock().unwrap().insert(address.to_string());
    }

    fn result(&self) -> Result<(), MailError> {
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(MailError::Rejected),
        }
    }
}

impl Mailer for MockMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        self.0.calls_to_send.fetch_add(1, Ordering::SeqCst);
        let fails = self.0.failing.lock().unwrap().contains(&email.to);
        self.0.sent.lock().unwrap().push(email);
        if fails {
            return Err(MailError::Rejected);
        }
        self.result()
    }

    async fn verify(&self) -> Result<(), MailError> {
        self.0.calls_to_verify.fetch_add(1, Ordering::SeqCst);
        self.result()
    }
}

/// State with mocks, no vendor assets, no voice keys and a static directory
/// that does not exist.
pub fn test_state<S: BookingStore, M: Mailer>(store: S, mailer: M) -> AppState<S, M> {
    let scratch = std::env::temp_dir().join(format!("booking-intake-{}", Uuid::new_v4()));
    AppState {
        store,
        mailer,
        dedup: DedupCache::new(Duration::from_secs(120)),
        vendor: VendorAssets::new(scratch.join("vendor"), Vec::new()).unwrap(),
        voice: VoiceSessions::new(VoiceSettings::default()).unwrap(),
        settings: Arc::new(Settings {
            defaults: BookingDefaults::default(),
            notifications: NotificationSettings {
                from_email: Some("bookings@example.com".into()),
                sales_email: Some("sales@example.com".into()),
                brand_name: "Acme".into(),
            },
            static_dir: scratch.join("public"),
        }),
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_upstream(router: Router) -> (JoinHandle<()>, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (server, base)
}

pub async fn spawn_app<S: BookingStore, M: Mailer>(
    state: AppState<S, M>,
) -> (JoinHandle<()>, String) {
    spawn_upstream(create_app(state)).await
}
