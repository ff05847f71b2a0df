use crate::backend::{BookingStore, StoreError};
use crate::types::{Booking, NewBooking, StoreInfo};
use chrono::Utc;
use std::sync::{Arc, Mutex};

/// In-process store used when no database is configured. Rows live as long
/// as the process does.
#[derive(Debug, Clone, Default)]
pub struct LocalBookings {
    bookings: Arc<Mutex<Vec<Booking>>>,
}

impl LocalBookings {
    #[cfg(test)]
    pub fn bookings(&self) -> Vec<Booking> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Booking>> {
        // A panic while holding the lock cannot leave a half-written row behind.
        self.bookings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BookingStore for LocalBookings {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn insert_booking(&self, booking: &NewBooking) -> Result<i32, StoreError> {
        let mut bookings = self.lock();
        let id = bookings.len() as i32 + 1;
        bookings.push(Booking {
            id,
            created_at: Utc::now(),
            booking: booking.clone(),
        });
        Ok(id)
    }

    fn info(&self) -> Result<StoreInfo, StoreError> {
        Ok(StoreInfo {
            backend: "memory".into(),
            table_exists: true,
            columns: Vec::new(),
            row_count: self.lock().len() as i64,
        })
    }
}
