pub mod activity;
pub mod backend;
pub mod connector;
pub mod error;
pub mod relay;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use lucida_core::config::RelayConfig;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::backend::HttpBackend;
use crate::connector::{ConnectorClient, ConnectorCredentials};
use crate::state::AppState;

/// Build the axum Router with all relay routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    // Browser clients poll /api/query from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/messages", post(routes::messages::receive_activity))
        .route("/api/query", post(routes::query::submit_query))
        .route("/api/query/{request_id}", get(routes::query::poll_query))
        .route("/api/health", get(routes::health::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Wire the HTTP backend and channel connector described by `config`,
/// forwarding to `backend_url`.
pub fn build_state(config: &RelayConfig, backend_url: &str) -> anyhow::Result<AppState> {
    let backend = HttpBackend::new(backend_url)?;
    let credentials = match (
        &config.connector_token_url,
        &config.app_id,
        &config.app_password,
    ) {
        (Some(token_url), Some(app_id), Some(app_password)) => Some(ConnectorCredentials {
            token_url: token_url.clone(),
            app_id: app_id.clone(),
            app_password: app_password.clone(),
        }),
        _ => None,
    };
    let connector = ConnectorClient::new(credentials)?;
    Ok(AppState::with_parts(Arc::new(backend), Arc::new(connector)))
}

/// Start the relay on a pre-bound listener.
///
/// Accepting a bound `TcpListener` lets the caller read the actual port
/// before serving (useful when `port = 0` and the OS picks a free port).
pub async fn serve_on(listener: tokio::net::TcpListener, app_state: AppState) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("relay listening on http://0.0.0.0:{actual_port}/api/messages");

    axum::serve(listener, app).await?;
    Ok(())
}
