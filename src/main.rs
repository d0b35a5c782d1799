//! Social media suite API server entry point.

use std::net::SocketAddr;

use axum::http::{header::HeaderValue, Method};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use social_media_suite::api::{create_routes, AppState};
use social_media_suite::bootstrap::{
    connect_database, flush_sentry, init_sentry, init_tracing, shutdown_signal,
};
use social_media_suite::config::{close_cache, close_db, init_cache, APP_CONFIG};
use social_media_suite::social::LinkedInClient;
use social_media_suite::tasks::TaskQueue;
use social_media_suite::utils::cookie_key;

// High-performance memory allocator for non-MSVC targets
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    init_tracing();
    let _guard = init_sentry();

    let db = connect_database().await;

    // Initialize Redis (task queue and results)
    let cache = match init_cache().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to connect to Redis: {}", e);
            std::process::exit(1);
        }
    };

    if !APP_CONFIG.linkedin_configured() {
        tracing::warn!("LinkedIn OAuth credentials missing, login will fail");
    }

    let queue = TaskQueue::new(cache.clone(), &APP_CONFIG);
    let linkedin = LinkedInClient::new(&APP_CONFIG);
    let state = AppState::new(db, cache, queue, linkedin, cookie_key());

    let cors = build_cors_layer();

    // Configure rate limiting with SmartIpKeyExtractor for better IP detection
    let governor_config = GovernorConfigBuilder::default()
        .per_second(APP_CONFIG.rate_limit_per_second)
        .burst_size(APP_CONFIG.rate_limit_burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limiter config");

    // Layer order (bottom to top execution): CORS -> Compression -> Trace -> Rate Limit
    let app = create_routes(state)
        .layer(cors)
        .layer(
            CompressionLayer::new()
                .br(true)
                .gzip(true)
                .zstd(true)
                .quality(tower_http::compression::CompressionLevel::Default),
        )
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_config));

    let port: u16 = APP_CONFIG.server_port.parse().unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(
        port = port,
        base_url = %APP_CONFIG.base_url,
        rate_limit_per_second = APP_CONFIG.rate_limit_per_second,
        rate_limit_burst = APP_CONFIG.rate_limit_burst_size,
        "Starting server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // ConnectInfo is needed by the rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    tracing::info!("Shutting down...");

    close_db().await;
    close_cache();
    flush_sentry();

    tracing::info!("Shutdown complete");
}

/// Builds the CORS layer based on configuration.
///
/// Credentials (the session cookie) are only allowed with an explicit origin list.
fn build_cors_layer() -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let origins: Vec<HeaderValue> = APP_CONFIG
        .cors_origins
        .split(',')
        .filter(|s| s.trim() != "*")
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS is configured to allow all origins - not recommended for production");
        return CorsLayer::new()
            .allow_methods(methods)
            .allow_origin(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any);
    }

    tracing::info!(origins = ?origins, "CORS configured with specific origins");
    CorsLayer::new()
        .allow_methods(methods)
        .allow_origin(origins)
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
        .allow_credentials(true)
}
