use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};
use tracing::debug;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    email: String,
    date: String,
    time: String,
    time_zone: String,
}

impl DedupKey {
    pub fn new(email: &str, date: &str, time: &str, time_zone: &str) -> Self {
        Self {
            email: email.trim().to_lowercase(),
            date: date.trim().into(),
            time: time.trim().into(),
            time_zone: time_zone.trim().into(),
        }
    }
}

/// Short-lived memory of recent submissions, used to swallow accidental
/// double submits. Entries expire after `ttl`.
#[derive(Debug, Clone)]
pub struct DedupCache {
    entries: Arc<Mutex<HashMap<DedupKey, Instant>>>,
    ttl: Duration,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::default(),
            ttl,
        }
    }

    /// Returns `true` if `key` was seen within the window. Otherwise records it.
    pub fn check_and_mark(&self, key: DedupKey) -> bool {
        self.check_and_mark_at(key, Instant::now())
    }

    fn check_and_mark_at(&self, key: DedupKey, now: Instant) -> bool {
        let mut entries = self.lock();
        if let Some(expiry) = entries.get(&key) {
            if *expiry > now {
                return true;
            }
        }
        entries.insert(key, now + self.ttl);
        false
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, expiry| *expiry > now);
        before - entries.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Sweeps expired entries every [`SWEEP_INTERVAL`] until the runtime stops.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, "Swept expired booking dedup entries");
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DedupKey, Instant>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
