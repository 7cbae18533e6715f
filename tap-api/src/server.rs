//! API Server setup

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::middleware::{rate_limit, start_cleanup_task, RateLimiter};
use crate::routes::create_router;
use crate::state::AppState;
use tap_db::{open_store, GameStore, StoreConfig};

/// Server bootstrap result
pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Router with tracing, CORS, security headers, body limit and rate limiting applied
pub fn build_app(state: AppState, config: &ServerConfig) -> ServerResult<(Router, RateLimiter)> {
    let limiter = RateLimiter::new(config.rate_limit());

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin()?)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let router = create_router(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(limiter.clone(), rate_limit))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok((router, limiter))
}

/// Create the API server over an already opened store
pub async fn create_server(
    config: &ServerConfig,
    store: Arc<dyn GameStore>,
) -> ServerResult<(Router, SocketAddr, RateLimiter)> {
    let state = AppState::new(store, config);
    let (router, limiter) = build_app(state, config)?;
    let addr: SocketAddr = config.bind_address().parse()?;

    Ok((router, addr, limiter))
}

/// Open the configured store and serve until the process stops
pub async fn run_server(config: ServerConfig) -> ServerResult<()> {
    if config.dev_mode {
        tracing::warn!("Development mode: launch data signatures are not enforced");
    }

    let store = open_store(&StoreConfig::with_data_dir(config.data_dir.clone()))?;
    tracing::info!(backend = store.backend_name(), data_dir = %config.data_dir, "Store opened");

    let (router, addr, limiter) = create_server(&config, store).await?;
    start_cleanup_task(limiter, Duration::from_millis(config.rate_limit_window_ms.max(1000)));

    tracing::info!("Tap API server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Start server in background (for testing)
pub async fn start_background_server(
    config: &ServerConfig,
    store: Arc<dyn GameStore>,
) -> ServerResult<SocketAddr> {
    let (router, addr, _limiter) = create_server(config, store).await?;

    // Bind to get actual address (useful when port is 0)
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tokio::spawn(async move {
        let service = router.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
