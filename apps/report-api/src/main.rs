//! Report intake server
//!
//! Turns daily underwriting and returns PDF reports into structured JSON and
//! runs CSV snapshots through a preview/confirm cycle before anything is
//! forwarded downstream.
//!
//! - `GET /health`
//! - `POST /extract`, `POST /returns`, `POST /extract/:document_type`
//! - `POST /compare/preview`, `POST /compare/confirm`
//!
//! Staged previews live in memory only. A background task sweeps expired
//! tokens and the cache is cleared on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod compare;
mod config;
mod error;
mod form;
mod forward;
mod state;
#[cfg(test)]
mod tests;

use api::{handle_extract_returns, handle_extract_typed, handle_extract_underwriting, handle_health};
use compare::{handle_confirm, handle_preview};
use config::Config;
use forward::HttpForwarder;
use state::AppState;

/// Multipart framing on top of the per-file limit
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    // A preview may carry both the candidate and a baseline file
    let body_limit = state.config.max_upload_bytes() * 2 + BODY_OVERHEAD_BYTES;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/extract", post(handle_extract_underwriting))
        .route("/returns", post(handle_extract_returns))
        .route("/extract/:document_type", post(handle_extract_typed))
        .route("/compare/preview", post(handle_preview))
        .route("/compare/confirm", post(handle_confirm))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let config = Config::parse();

    let default_level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("report_api={}", default_level).parse()?)
        .add_directive("tower_http=info".parse()?);
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let forwarder = Arc::new(HttpForwarder::new(config.forward_timeout())?);
    let state = Arc::new(AppState::new(config, forwarder));
    let sweeper = state.uploads.spawn_sweeper(state.config.sweep_interval());

    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!(
        "Upload limit: {} MB, preview TTL: {}s, min text: {} chars",
        state.config.max_upload_mb, state.config.upload_ttl_secs, state.config.min_text_chars
    );
    if let Some(url) = &state.config.forward_url {
        info!("Default forward destination: {}", url);
    }

    axum::serve(listener, build_router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    state.uploads.clear().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
