//! Pillbox - a local-first medication reminder service.
//!
//! # Configuration
//!
//! All configuration comes from environment variables:
//!
//! - `PILLBOX_PORT` - Listen port (default: 3000)
//! - `PILLBOX_DATABASE_URL` - SQLite connection string
//!   (default: `sqlite:pillbox.db?mode=rwc`)
//! - `PILLBOX_ASSISTANT_API_KEY` - Chat-completion API key; the assistant
//!   endpoint answers with an error reply when unset
//! - `PILLBOX_ASSISTANT_API_BASE` - Alternate OpenAI-compatible base URL
//! - `PILLBOX_NOTIFICATION_PERMISSION` - Initial permission state
//!   (`default`, `granted`, or `denied`; default: `default`)

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pillbox::api::{AppState, router};
use pillbox::assistant::AssistantClient;
use pillbox::notify::{LogNotifier, PermissionGate, PermissionState};
use pillbox::repository::ReminderRepository;
use pillbox::resync::SchedulerSet;
use pillbox::storage::Storage;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:pillbox.db?mode=rwc";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("pillbox=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("PILLBOX_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url = env::var("PILLBOX_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    let permission: PermissionState = env::var("PILLBOX_NOTIFICATION_PERMISSION")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or_default();

    let assistant_key = env::var("PILLBOX_ASSISTANT_API_KEY").ok();
    let assistant = match env::var("PILLBOX_ASSISTANT_API_BASE") {
        Ok(base) => AssistantClient::with_base_url(&base, assistant_key),
        Err(_) => AssistantClient::new(assistant_key),
    };

    info!(port, db_url = %db_url, permission = ?permission, "Starting Pillbox server");

    // Initialize storage
    let storage = Storage::new(&db_url).await?;
    info!("Database initialized");

    // Create application state
    let state = AppState {
        reminders: ReminderRepository::new(storage),
        schedulers: SchedulerSet::new(),
        gate: Arc::new(PermissionGate::new(permission)),
        notifier: Arc::new(LogNotifier),
        assistant,
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Pillbox is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
