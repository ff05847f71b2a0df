#[macro_use]
extern crate diesel;
use std::time::Duration;

use crate::{
    backend::{run_blocking, BookingStore},
    configuration::Configuration,
    database_interface::DatabaseInterface,
    http::create_app,
    local_bookings::LocalBookings,
    mailer::{Mailer, SmtpMailer},
    state::AppState,
};
use anyhow::Context;
use tokio::{net::TcpListener, signal, time::sleep};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod backend;
mod calendar;
mod configuration;
mod database_interface;
mod dedup;
mod error;
mod http;
mod intake;
mod local_bookings;
mod mailer;
mod normalizer;
mod notifications;
mod schema;
mod slots;
mod state;
#[cfg(test)]
mod testutils;
mod timezone;
mod types;
mod vendor;
mod voice_sessions;

const SCHEMA_ATTEMPTS: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("##################");
    println!("# Booking Intake #");
    println!("##################");

    let configuration = Configuration::parse_arguments();

    let mailer = SmtpMailer::new(&configuration.smtp_settings())
        .context("Failed to set up the mail transport")?;
    if !mailer.is_configured() {
        warn!("SMTP_HOST or FROM_EMAIL missing, booking emails will be reported as failed");
    }

    let address = configuration.address();
    println!("Accessable at:\n{}", address);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    if let Some(database_url) = configuration.database_url.clone() {
        let backend = DatabaseInterface::new(&database_url);
        prepare_schema(&backend).await;
        serve(listener, AppState::new(backend, mailer, &configuration)?).await
    } else {
        warn!("DATABASE_URL not set, bookings are kept in memory only");
        let backend = LocalBookings::default();
        serve(listener, AppState::new(backend, mailer, &configuration)?).await
    }
}

/// A database that is down at startup must not keep the site offline, so
/// after a few attempts the server starts anyway and inserts fail per request.
async fn prepare_schema<S: BookingStore>(backend: &S) {
    for attempt in 1..=SCHEMA_ATTEMPTS {
        match run_blocking(backend, |store| store.ensure_schema()).await {
            Ok(()) => {
                info!("Booking table is ready");
                return;
            }
            Err(err) => {
                error!(%err, attempt, "Failed to prepare booking table. Retry in 1 sec.");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
    warn!("Starting without a verified booking table, use /api/db-migrate once the database is up");
}

async fn serve<S: BookingStore, M: Mailer>(
    listener: TcpListener,
    state: AppState<S, M>,
) -> anyhow::Result<()> {
    let sweeper = state.dedup.spawn_sweeper();
    let app = create_app(state);

    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(%err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(%err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
