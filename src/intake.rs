use crate::backend::{run_blocking, BookingStore};
use crate::dedup::DedupKey;
use crate::mailer::Mailer;
use crate::normalizer::{BookingRequest, LeadRequest};
use crate::notifications::{dispatch, NotificationReport};
use crate::state::AppState;
use crate::timezone::{parse_date, zoned_to_utc};
use crate::types::{NewBooking, Outcome};
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum IntakeResult {
    /// Same submission seen within the dedup window. Nothing was written or sent.
    Duplicate,
    Accepted(IntakeReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntakeReport {
    pub stored: Outcome,
    pub row_id: Option<i32>,
    pub notifications: NotificationReport,
}

impl IntakeReport {
    /// `false` only when no side effect went through at all.
    pub fn any_succeeded(&self) -> bool {
        self.stored.is_done()
            || self.notifications.confirmation.is_done()
            || self.notifications.sales_alert.is_done()
    }
}

/// Runs one submission through dedup, persistence and notification. Every
/// side effect is attempted once; failures are logged and reported.
pub async fn submit_booking<S: BookingStore, M: Mailer>(
    state: &AppState<S, M>,
    request: BookingRequest,
) -> IntakeResult {
    let key = DedupKey::new(
        &request.email,
        &request.date,
        &request.time,
        &request.time_zone,
    );
    if state.dedup.check_and_mark(key) {
        info!(email = %request.email, source = %request.source, "Duplicate submission ignored");
        return IntakeResult::Duplicate;
    }

    let start_utc = zoned_to_utc(&request.date, &request.time, &request.time_zone);
    if start_utc.is_none() && !request.date.is_empty() {
        warn!(
            date = %request.date,
            time = %request.time,
            time_zone = %request.time_zone,
            "Could not resolve requested time to UTC"
        );
    }

    let new_booking = new_booking(&request, start_utc);
    let (stored, row_id) =
        match run_blocking(&state.store, move |store| store.insert_booking(&new_booking)).await {
            Ok(id) => (Outcome::Done, Some(id)),
            Err(err) => {
                error!(%err, email = %request.email, "Failed to store booking");
                (Outcome::Failed(err.to_string()), None)
            }
        };

    let notifications = dispatch(
        &state.mailer,
        &state.settings.notifications,
        &request,
        start_utc,
    )
    .await;

    let report = IntakeReport {
        stored,
        row_id,
        notifications,
    };
    info!(
        email = %request.email,
        source = %request.source,
        stored = %report.stored,
        sales_alert = %report.notifications.sales_alert,
        confirmation = %report.notifications.confirmation,
        "Booking processed"
    );
    IntakeResult::Accepted(report)
}

/// Webhook leads carry no schedule, so their dedup key has an empty date
/// and time and repeated deliveries of one lead still collapse.
pub async fn submit_lead<S: BookingStore, M: Mailer>(
    state: &AppState<S, M>,
    lead: LeadRequest,
) -> IntakeResult {
    submit_booking(state, lead.into_booking_request(&state.settings.defaults)).await
}

pub fn new_booking(request: &BookingRequest, start_utc: Option<DateTime<Utc>>) -> NewBooking {
    NewBooking {
        full_name: request.full_name.clone(),
        email: request.email.clone(),
        phone: request.phone.clone(),
        company: request.company.clone(),
        date: parse_date(&request.date),
        time: (!request.time.is_empty()).then(|| request.time.clone()),
        time_zone: Some(request.time_zone.clone()),
        duration_minutes: Some(request.duration_minutes),
        start_utc,
        end_utc: start_utc.and_then(|start| {
            start.checked_add_signed(Duration::minutes(i64::from(request.duration_minutes)))
        }),
        notes: request.notes.clone(),
        source: Some(request.source.clone()),
    }
}
