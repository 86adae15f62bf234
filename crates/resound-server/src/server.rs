//! Router assembly and server lifecycle

use std::time::Duration;

use axum::extract::State;
use axum::http::header;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::api::{self, ApiError};
use crate::config::ServerConfig;
use crate::metrics;
use crate::state::AppState;

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/", get(api::catalogs::list_catalogs))
        .route(
            "/:catalog",
            get(api::catalogs::get_catalog)
                .put(api::catalogs::create_catalog)
                .delete(api::catalogs::delete_catalog)
                .post(api::tracks::create_anonymous_track),
        )
        .route("/:catalog/_search", post(api::search::search))
        .route(
            "/:catalog/:track",
            get(api::tracks::get_track)
                .put(api::tracks::create_track)
                .delete(api::tracks::delete_track),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::require_account,
        ));

    Router::new()
        .route("/_health", get(health))
        .route("/_metrics", get(metrics_text))
        .nest("/v1/priv", v1)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    if state.is_healthy() {
        Json(serde_json::json!({})).into_response()
    } else {
        ApiError::unavailable("Service is unavailable").into_response()
    }
}

async fn metrics_text() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_text(),
    )
        .into_response()
}

async fn not_found() -> ApiError {
    ApiError::not_found("Page not found")
}

/// Serve until a shutdown signal arrives, then drain and stop.
pub async fn run(config: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state, config.shutdown_delay))
        .await?;

    tracing::info!("Done");
    Ok(())
}

/// Wait for SIGINT/SIGTERM, flip the health gate off so load balancers stop
/// routing to this instance, then give in-flight traffic `delay` to drain.
async fn shutdown_signal(state: AppState, delay: Duration) {
    wait_for_signal().await;
    tracing::info!("Stopping in {:?}...", delay);
    state.set_healthy(false);
    tokio::time::sleep(delay).await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
