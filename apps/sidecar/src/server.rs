// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Router assembly, middleware stack, and the ordered shutdown unwind.

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::fspipe_listener;
use crate::handlers::{domsync, media, recording, sse};
use crate::state::AppState;

async fn healthz(state: axum::extract::State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "scale_to_zero_held": state.recorders.scale_to_zero().is_held(),
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new();
    }
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let values: Vec<HeaderValue> =
        origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(values))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/recordings/start", post(recording::start))
        .route("/recordings/stop", post(recording::stop))
        .route("/recordings/force_stop", post(recording::force_stop))
        .route("/recordings/delete", post(recording::delete))
        .route("/recordings/download", get(recording::download))
        .route("/recordings/list", get(recording::list))
        .route("/recordings/{id}/output", get(sse::recording_output))
        .route("/dom-sync", get(domsync::upgrade))
        .route("/input/devices/virtual/configure", post(media::configure))
        .route("/input/devices/virtual/pause", post(media::pause))
        .route("/input/devices/virtual/resume", post(media::resume))
        .route("/input/devices/virtual/stop", post(media::stop))
        .route("/status", get(media::status))
        .route("/metrics", get(sse::metrics))
        .route("/clipboard", get(sse::clipboard))
        .route("/fs-watch", get(sse::fs_watch))
        .route("/fspipe/channels", get(sse::fspipe_channels))
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(
            ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &axum::http::Request<_>| {
                        let route = request
                            .extensions()
                            .get::<axum::extract::MatchedPath>()
                            .map_or_else(|| request.uri().path(), |matched| matched.as_str());
                        tracing::info_span!("http_request", method = %request.method(), route = %route)
                    })
                    .on_response(DefaultOnResponse::new().level(tracing::Level::DEBUG))
                    .on_failure(DefaultOnFailure::new().level(tracing::Level::WARN)),
            ),
        )
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[allow(clippy::expect_used)]
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[allow(clippy::expect_used)]
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received CTRL-C, starting graceful shutdown"),
        () = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
}

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// Runs the ordered unwind once shutdown has been signalled: close the SSE
/// hubs, stop every recorder, stop virtual-media tracks, and let the fspipe
/// listener and dom-sync reconnect loop observe the cancellation token. Each
/// stage is bounded so shutdown can't hang indefinitely on one subsystem.
async fn shut_down(state: &AppState) {
    state.shutdown.trigger();
    state.clipboard_hub.close();
    state.fs_watch_hub.close();

    let stop_recordings = async {
        let failures = state.recorders.stop_all().await;
        for (id, err) in failures {
            warn!(id, error = %err, "recording session failed to stop cleanly during shutdown");
        }
    };
    if tokio::time::timeout(SHUTDOWN_DEADLINE, stop_recordings).await.is_err() {
        warn!("timed out stopping recording sessions during shutdown");
    }

    if tokio::time::timeout(SHUTDOWN_DEADLINE, state.virtual_media.stop()).await.is_err() {
        warn!("timed out stopping virtual media tracks during shutdown");
    }
}

/// Binds the HTTP server and the FsPipe TCP listener and runs until a
/// shutdown signal is received.
///
/// # Errors
/// Returns an error if the configured bind address cannot be parsed or bound.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(config);
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(&state.config.server.bind_address).await?;
    info!(address = %state.config.server.bind_address, "sidecar HTTP server listening");

    let fspipe_config = state.config.fspipe.clone();
    let fspipe_state = state.clone();
    let fspipe_cancel = state.shutdown.token();
    tokio::spawn(async move {
        fspipe_listener::run(&fspipe_config, fspipe_state, fspipe_cancel).await;
    });

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    shut_down(&state).await;
    Ok(())
}

#[cfg(test)]
mod cors_tests {
    use super::cors_layer;

    #[test]
    fn empty_origin_list_is_most_restrictive() {
        // No panics and no wildcard: constructing it is the behavior under test,
        // `CorsLayer` has no public introspection.
        let _ = cors_layer(&[]);
    }

    #[test]
    fn wildcard_origin_is_permissive() {
        let _ = cors_layer(&["*".to_string()]);
    }

    #[test]
    fn invalid_origin_values_are_filtered_not_fatal() {
        let origins = vec!["https://example.com".to_string(), "not a valid header value \n".to_string()];
        let _ = cors_layer(&origins);
    }
}
