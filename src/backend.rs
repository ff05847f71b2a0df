use crate::types::{NewBooking, StoreInfo};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Storage task failed: {0}")]
    Task(String),
}

pub trait BookingStore: Clone + Send + Sync + 'static {
    fn ensure_schema(&self) -> Result<(), StoreError>;
    fn insert_booking(&self, booking: &NewBooking) -> Result<i32, StoreError>;
    fn info(&self) -> Result<StoreInfo, StoreError>;
}

/// Runs a blocking store call off the async runtime.
pub async fn run_blocking<S, T, F>(store: &S, call: F) -> Result<T, StoreError>
where
    S: BookingStore,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, StoreError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || call(&store))
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
}
