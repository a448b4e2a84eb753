// HTTP server setup: state wiring, router construction, and the
// accept loop

pub mod handlers;
pub mod negotiation;
pub mod request;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header::HeaderName, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::auth::KeyAuthenticator;
use crate::config::Config;
use crate::ghostscript;
use crate::ghostscript::executor::Executor;
use crate::rate_limit::{RateLimitBackend, RateLimitManager};
use crate::staging::ArtifactStore;

/// Slack on top of the upload cap for multipart framing overhead
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub authenticator: Arc<KeyAuthenticator>,
    pub limiter: Arc<dyn RateLimitBackend>,
    pub artifacts: Arc<ArtifactStore>,
    pub executor: Arc<Executor>,
}

impl AppState {
    /// Wire up all components from the loaded configuration.
    ///
    /// Must be called from within the tokio runtime: the rate limiter's
    /// cleanup task is spawned here.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let authenticator = KeyAuthenticator::from_bindings(config.auth.api_keys.as_deref());

        let limiter = Arc::new(RateLimitManager::new(
            config.limits.rate_limit.quota,
            Duration::from_secs(config.limits.rate_limit.window_secs),
        ));
        limiter.start_cleanup_task(None);

        let artifacts = ArtifactStore::new(
            config.storage.upload_dir.clone(),
            config.storage.output_dir.clone(),
        )?;

        // Prefer the configured command; fall back to whatever the PATH
        // offers so a bare `gs` install works out of the box. When nothing
        // resolves, keep the default name and let invocation classify the
        // engine as unavailable.
        let command = config
            .ghostscript
            .command
            .clone()
            .or_else(|| {
                ghostscript::detect_executable(None).map(|path| path.display().to_string())
            })
            .unwrap_or_else(|| "gs".to_string());
        let executor = Executor::new(
            command,
            Duration::from_secs(config.ghostscript.timeout_secs),
        );

        Ok(Self {
            config: Arc::new(config),
            authenticator: Arc::new(authenticator),
            limiter,
            artifacts: Arc::new(artifacts),
            executor: Arc::new(executor),
        })
    }
}

/// Build the application router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.limits.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/version", get(handlers::version))
        .route("/api/compress", post(handlers::compress))
        .layer(DefaultBodyLimit::max(body_limit as usize))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("no-referrer"),
        ))
        .with_state(state)
}

/// Run the server until the process is stopped
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let address = config.server.address.clone();
    let port = config.server.port;

    match ghostscript::detect_executable(config.ghostscript.command.as_deref()) {
        Some(path) => tracing::info!(ghostscript = %path.display(), "Compression engine detected"),
        None => tracing::warn!(
            "Ghostscript executable not found; compression requests will fail until it is installed"
        ),
    }

    let state = AppState::from_config(config)?;
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind((address.as_str(), port)).await?;
    tracing::info!(address = %address, port = port, "Starting pdfpress");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
