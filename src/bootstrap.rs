//! Process startup and shutdown shared by the API server and the worker.

use std::time::Duration;

use sqlx::PgPool;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{init_db, APP_CONFIG};

/// Default log filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "social_media_suite=debug,tower_http=debug,axum=trace";

/// Installs the global tracing subscriber.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Starts Sentry when a DSN is configured. Keep the guard alive until exit.
pub fn init_sentry() -> Option<sentry::ClientInitGuard> {
    if APP_CONFIG.sentry_dsn.is_empty() {
        tracing::warn!("Sentry DSN not configured, error tracking disabled");
        return None;
    }

    Some(sentry::init((
        APP_CONFIG.sentry_dsn.clone(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(if APP_CONFIG.is_production {
                "production".into()
            } else {
                "development".into()
            }),
            traces_sample_rate: APP_CONFIG.sentry_traces_sample_rate,
            sample_rate: 1.0, // Capture all errors
            ..Default::default()
        },
    )))
}

/// Flushes pending Sentry events before exit.
pub fn flush_sentry() {
    if let Some(client) = sentry::Hub::current().client() {
        client.flush(Some(Duration::from_secs(2)));
    }
}

/// Connects to Postgres and applies migrations when enabled.
///
/// Exits the process on failure; neither binary can run without the database.
pub async fn connect_database() -> PgPool {
    let db = match init_db().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if APP_CONFIG.run_migrations {
        tracing::info!("Running database migrations...");
        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::error!("Failed to run migrations: {}", e);
            std::process::exit(1);
        }
        tracing::info!("Database migrations completed");
    }
    db
}

/// Handles shutdown signals for graceful termination.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        },
    }
}
