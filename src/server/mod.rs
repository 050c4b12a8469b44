//! Backend — Axum web server for config distribution, auth, and per-user
//! finance snapshots.
//!
//! Everything is in memory; restart loses state. CORS enabled for local
//! development.

pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use routes::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/config", get(routes::get_config).put(routes::put_config))
        .route("/auth/register", post(routes::register))
        .route("/auth/login", post(routes::login))
        .route("/finance", get(routes::get_finance).put(routes::put_finance))
        .route("/finance/expense", post(routes::post_expense))
        .route("/finance/expense/:id", axum::routing::delete(routes::delete_expense))
        .route("/finance/income", post(routes::post_income))
        .route("/finance/income/:id", axum::routing::delete(routes::delete_income))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the task is cancelled.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Backend listening on http://localhost:{port}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind backend port")?;
    axum::serve(listener, app)
        .await
        .context("Backend server error")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
