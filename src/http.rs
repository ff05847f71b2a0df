use crate::backend::{run_blocking, BookingStore};
use crate::error::AppError;
use crate::intake::{self, IntakeResult};
use crate::mailer::{Mailer, OutgoingEmail};
use crate::normalizer::{BookingRequest, LeadRequest};
use crate::slots::demo_slots;
use crate::state::AppState;
use crate::timezone::{parse_date, to_iso};
use crate::vendor::AssetSource;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::fs;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const VENDOR_CACHE_CONTROL: &str = "public, max-age=604800";
const PAGE_CACHE_CONTROL: &str = "no-cache";
const ASSET_CACHE_CONTROL: &str = "public, max-age=3600";
const JAVASCRIPT: &str = "application/javascript; charset=utf-8";
const VENDOR_SOURCE_HEADER: HeaderName = HeaderName::from_static("x-vendor-source");

type ApiResult = Result<Json<Value>, AppError>;

#[derive(Debug, Deserialize)]
struct SlotsQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VendorQuery {
    refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailTestQuery {
    to: Option<String>,
}

#[derive(Debug, Serialize)]
struct VendorCacheEntry {
    name: String,
    cached: bool,
    bytes: u64,
}

pub fn create_app<S: BookingStore, M: Mailer>(state: AppState<S, M>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let booking = Router::new()
        .route("/api/health", get(health))
        .route("/api/slots", get(slots))
        .route("/api/book", post(book::<S, M>))
        .route("/api/retell/book_demo", post(retell_book_demo::<S, M>));

    let vendor = Router::new()
        .route("/api/retell/token", post(retell_web_call::<S, M>))
        .route("/api/retell/create-web-call", post(retell_web_call::<S, M>))
        .route("/api/openai/realtime-session", post(realtime_session::<S, M>))
        .route("/vendor/:asset", get(vendor_asset::<S, M>));

    let diagnostics = Router::new()
        .route("/api/db-info", get(db_info::<S, M>))
        .route("/api/db-migrate", post(db_migrate::<S, M>))
        .route("/api/email-verify", get(email_verify::<S, M>))
        .route("/api/email-test", get(email_test::<S, M>))
        .route("/api/static-check", get(static_check::<S, M>));

    let static_files = ServeDir::new(&state.settings.static_dir);

    Router::new()
        .merge(booking)
        .merge(vendor)
        .merge(diagnostics)
        .fallback_service(static_files)
        .layer(middleware::from_fn(cache_headers))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Pages revalidate on every load, fingerprint-free assets get a short cache
/// and vendored bundles a long one. Handlers that set their own header win.
async fn cache_headers(request: Request, next: Next) -> Response {
    let policy = cache_policy(request.uri().path());
    let mut response = next.run(request).await;

    if let Some(policy) = policy {
        if response.status().is_success() && !response.headers().contains_key(CACHE_CONTROL) {
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static(policy));
        }
    }
    response
}

fn cache_policy(path: &str) -> Option<&'static str> {
    if path.starts_with("/api/") {
        return None;
    }
    if path.starts_with("/vendor/") {
        return Some(VENDOR_CACHE_CONTROL);
    }
    let file_name = path.rsplit('/').next().unwrap_or_default();
    if file_name.is_empty() || file_name.ends_with(".html") || !file_name.contains('.') {
        Some(PAGE_CACHE_CONTROL)
    } else {
        Some(ASSET_CACHE_CONTROL)
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn slots(Query(query): Query<SlotsQuery>) -> ApiResult {
    let date = query
        .date
        .as_deref()
        .and_then(parse_date)
        .ok_or_else(|| AppError::InvalidQuery("Expected date=YYYY-MM-DD".into()))?;
    let slots: Vec<String> = demo_slots(date).iter().map(to_iso).collect();
    Ok(Json(json!({ "slots": slots })))
}

async fn book<S: BookingStore, M: Mailer>(
    State(state): State<AppState<S, M>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload.map_err(|_| AppError::MalformedPayload)?;
    let request = BookingRequest::from_json(&body, &state.settings.defaults)?;
    respond(
        intake::submit_booking(&state, request).await,
        json!({ "ok": true }),
    )
}

async fn retell_book_demo<S: BookingStore, M: Mailer>(
    State(state): State<AppState<S, M>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload.map_err(|_| AppError::MalformedPayload)?;
    let lead = LeadRequest::from_json(&body)?;
    respond(
        intake::submit_lead(&state, lead).await,
        json!({ "ok": true, "result": "Thanks, the team will reach out shortly." }),
    )
}

fn respond(result: IntakeResult, success: Value) -> ApiResult {
    match result {
        IntakeResult::Duplicate => Ok(Json(success)),
        IntakeResult::Accepted(report) if report.any_succeeded() => Ok(Json(success)),
        IntakeResult::Accepted(report) => Err(AppError::Internal(format!(
            "no side effect succeeded: stored {}, sales alert {}, confirmation {}",
            report.stored, report.notifications.sales_alert, report.notifications.confirmation
        ))),
    }
}

async fn retell_web_call<S: BookingStore, M: Mailer>(
    State(state): State<AppState<S, M>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = payload.map(|Json(body)| body).unwrap_or(Value::Null);
    let agent_id = string_field(&body, &["agentId", "agent_id"]);
    let call = state.voice.create_web_call(agent_id).await?;
    ok_with(&call)
}

async fn realtime_session<S: BookingStore, M: Mailer>(
    State(state): State<AppState<S, M>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let body = payload.map(|Json(body)| body).unwrap_or(Value::Null);
    let session = state
        .voice
        .realtime_session(
            string_field(&body, &["model"]),
            string_field(&body, &["voice"]),
        )
        .await?;
    ok_with(&session)
}

async fn vendor_asset<S: BookingStore, M: Mailer>(
    State(state): State<AppState<S, M>>,
    Path(name): Path<String>,
    Query(query): Query<VendorQuery>,
) -> Result<Response, AppError> {
    let asset = state.vendor.find(&name).ok_or(AppError::NotFound)?;
    let bypass_cache = matches!(query.refresh.as_deref(), Some("1" | "true"));
    let served = state.vendor.serve(asset, bypass_cache).await;

    let cache_control = match served.source {
        AssetSource::Stub => "no-store",
        _ => VENDOR_CACHE_CONTROL,
    };
    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static(JAVASCRIPT)),
            (CACHE_CONTROL, HeaderValue::from_static(cache_control)),
            (
                VENDOR_SOURCE_HEADER,
                HeaderValue::from_static(served.source.as_str()),
            ),
        ],
        served.body,
    )
        .into_response())
}

async fn db_info<S: BookingStore, M: Mailer>(State(state): State<AppState<S, M>>) -> ApiResult {
    let info = run_blocking(&state.store, |store| store.info())
        .await
        .map_err(|err| AppError::Unavailable(err.to_string()))?;
    ok_with(&info)
}

async fn db_migrate<S: BookingStore, M: Mailer>(State(state): State<AppState<S, M>>) -> ApiResult {
    run_blocking(&state.store, |store| store.ensure_schema())
        .await
        .map_err(|err| AppError::Unavailable(err.to_string()))?;
    info!("Booking table ensured on request");
    Ok(Json(json!({ "ok": true })))
}

async fn email_verify<S: BookingStore, M: Mailer>(
    State(state): State<AppState<S, M>>,
) -> ApiResult {
    state
        .mailer
        .verify()
        .await
        .map_err(|err| AppError::Unavailable(err.to_string()))?;
    Ok(Json(json!({ "ok": true })))
}

async fn email_test<S: BookingStore, M: Mailer>(
    State(state): State<AppState<S, M>>,
    Query(query): Query<EmailTestQuery>,
) -> ApiResult {
    let to = query
        .to
        .filter(|to| !to.trim().is_empty())
        .or_else(|| state.settings.notifications.sales_email.clone())
        .ok_or_else(|| AppError::InvalidQuery("No recipient given and no sales address configured".into()))?;

    let email = OutgoingEmail {
        to: to.clone(),
        reply_to: None,
        subject: format!("{}: test email", state.settings.notifications.brand_name),
        body: "This is a test message from the booking backend.\n".into(),
        invite: None,
    };
    state.mailer.send(email).await.map_err(|err| {
        warn!(%err, %to, "Test email failed");
        AppError::Unavailable(err.to_string())
    })?;
    Ok(Json(json!({ "ok": true, "to": to })))
}

async fn static_check<S: BookingStore, M: Mailer>(
    State(state): State<AppState<S, M>>,
) -> Json<Value> {
    let static_dir = &state.settings.static_dir;
    let static_dir_exists = fs::metadata(static_dir)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false);
    let index_html = fs::metadata(static_dir.join("index.html"))
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false);

    let mut vendor = Vec::new();
    for asset in state.vendor.assets() {
        let bytes = fs::metadata(state.vendor.cache_path(asset))
            .await
            .map(|metadata| metadata.len())
            .ok();
        vendor.push(VendorCacheEntry {
            name: asset.name.clone(),
            cached: bytes.is_some(),
            bytes: bytes.unwrap_or(0),
        });
    }

    Json(json!({
        "ok": static_dir_exists && index_html,
        "static_dir": static_dir.display().to_string(),
        "static_dir_exists": static_dir_exists,
        "index_html": index_html,
        "vendor_cache_dir": state.vendor.cache_dir().display().to_string(),
        "vendor": vendor,
    }))
}

fn ok_with<T: Serialize>(payload: &T) -> ApiResult {
    let mut value =
        serde_json::to_value(payload).map_err(|err| AppError::Internal(err.to_string()))?;
    if let Value::Object(fields) = &mut value {
        fields.insert("ok".into(), Value::Bool(true));
    }
    Ok(Json(value))
}

fn string_field(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}
