use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod i18n;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use config::Config;
use services::{
    delivery::Notifier,
    init,
    reviews::ReviewReminderSweep,
    scheduler::NotificationScheduler,
    telegram::{TelegramNotifier, TelegramService},
};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub telegram: Arc<RwLock<Option<TelegramService>>>,
    pub scheduler: NotificationScheduler,
    pub reviews: ReviewReminderSweep,
}

impl AppState {
    pub fn new(
        db: sqlx::SqlitePool,
        config: Config,
        telegram: Arc<RwLock<Option<TelegramService>>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let scheduler =
            NotificationScheduler::new(db.clone(), notifier.clone(), config.scheduler.clone());
        let reviews = ReviewReminderSweep::new(
            db.clone(),
            notifier,
            config.review_reminder.clone(),
            config.scheduler.delivery_timeout(),
        );

        Self {
            db,
            config,
            telegram,
            scheduler,
            reviews,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booking_notifications=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Booking Notifications Service");

    // Initialize database
    let pool = init::init_db(&config).await?;

    // Telegram delivery; the bot itself is started below and may stay absent
    let telegram = Arc::new(RwLock::new(None));
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(pool.clone(), telegram.clone()));

    let app_state = Arc::new(AppState::new(pool, config.clone(), telegram, notifier));

    init::initialize_optional_integrations(&app_state).await;

    // Create shutdown notifier for background workers
    let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    // Spawn background workers (returns JoinHandles so we can await shutdown)
    let bg_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    // Build router
    let app = routes::router()
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
                .allow_headers([
                    http::header::CONTENT_TYPE,
                    http::header::AUTHORIZATION,
                    http::header::ACCEPT,
                ]),
        );

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_fut = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    let shutdown_tx_clone = shutdown_tx.clone();
    let signal_fut = async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {},
                        _ = term.recv() => {},
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to bind SIGTERM, waiting for Ctrl+C only: {}", e);
                    let _ = ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        tracing::info!("Shutdown signal received, notifying background workers");
        let _ = shutdown_tx_clone.send(());
    };

    tokio::select! {
        res = server_fut => {
            if let Err(e) = res {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = signal_fut => {
            tracing::info!("Signal handler completed; server stopped accepting new connections");
        }
    }

    // Workers finish the sweep in flight before exiting.
    let shutdown_wait = config.scheduler.delivery_timeout() + Duration::from_secs(15);
    tracing::info!(
        "Waiting up to {}s for background workers to exit",
        shutdown_wait.as_secs()
    );

    let bg_wait = async {
        for h in bg_handles {
            if let Err(e) = h.await {
                tracing::error!("Background worker terminated abnormally: {}", e);
            }
        }
    };
    if tokio::time::timeout(shutdown_wait, bg_wait).await.is_err() {
        tracing::warn!("Background workers did not stop in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
