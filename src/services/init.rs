//! Initialization helpers for the application:
//! - database connection + migrations
//! - optional Telegram bot
//! - background sweep workers
//!
//! This module keeps `main.rs` down to wiring.

use std::{path::Path, sync::Arc};

use anyhow::Result;

use crate::config::Config;

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Filesystem path of a SQLite URL such as `sqlite://data/bookings.db`.
fn sqlite_path(db_url: &str) -> &str {
    db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))
        .unwrap_or(db_url)
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable),
/// opens a connection pool using `create_if_missing(true)` and runs migrations.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = sqlite_path(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let existed = db_file_path.exists();

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    if existed {
        tracing::info!("Connected to database file: {}", db_file_path.display());
    } else {
        tracing::info!("Database file created: {}", db_file_path.display());
    }

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Start the Telegram bot when a token is configured and store it into `AppState`.
///
/// A failing bot does not stop the application: deliveries then fail with
/// "Telegram service not initialized" until the process is restarted.
pub async fn initialize_optional_integrations(state: &Arc<crate::AppState>) {
    if let Some(ref token) = state.config.telegram.bot_token {
        tracing::info!("Initializing Telegram bot");
        match crate::services::telegram::TelegramService::new(token.clone()).await {
            Ok(telegram) => {
                *state.telegram.write().await = Some(telegram);
                tracing::info!("Telegram bot initialized successfully");
            }
            Err(e) => {
                tracing::warn!("Failed to initialize Telegram bot: {}", e);
            }
        }
    } else {
        tracing::warn!("TELEGRAM_BOT_TOKEN is not set; notifications will fail to deliver");
    }
}

/// Spawn background workers:
/// - the notification sweep every `check_interval_seconds`
/// - the review-reminder sweep every `interval_seconds`
///
/// Each worker listens for a shutdown notification via a
/// `tokio::sync::broadcast::Sender<()>` and finishes its current sweep first.
pub fn spawn_background_workers(
    state: Arc<crate::AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    if state.config.scheduler.enabled {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        let interval = state.config.scheduler.check_interval();
        tracing::info!(
            "Starting notification worker (interval {}s, batch {})",
            interval.as_secs(),
            state.config.scheduler.batch_size
        );
        handles.push(tokio::spawn(async move {
            loop {
                if let Err(e) = state.scheduler.run_sweep().await {
                    tracing::warn!("Notification sweep failed: {:?}", e);
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Notification worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }));
    } else {
        tracing::info!("Notification worker disabled");
    }

    if state.config.review_reminder.enabled {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        let interval = std::time::Duration::from_secs(state.config.review_reminder.interval_seconds);
        handles.push(tokio::spawn(async move {
            loop {
                if let Err(e) = state.reviews.run_review_reminder_sweep().await {
                    tracing::warn!("Review reminder sweep failed: {:?}", e);
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Review reminder worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }));
    } else {
        tracing::info!("Review reminder worker disabled");
    }

    handles
}
