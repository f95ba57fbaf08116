// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `POST /input/devices/virtual/{configure,pause,resume,stop}`, `GET /status`.

use axum::extract::State;
use axum::Json;
use sidecar_api::media::{ConfigureRequest, ConfigureResult, Status, TrackSelection};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn configure(
    State(state): State<AppState>,
    Json(request): Json<ConfigureRequest>,
) -> Result<Json<ConfigureResult>, ApiError> {
    let result = state.virtual_media.configure(request).await?;
    Ok(Json(result))
}

pub async fn pause(State(state): State<AppState>, Json(selection): Json<TrackSelection>) {
    state.virtual_media.pause(selection.video, selection.audio).await;
}

pub async fn resume(State(state): State<AppState>, Json(selection): Json<TrackSelection>) {
    state.virtual_media.resume(selection.video, selection.audio).await;
}

pub async fn stop(State(state): State<AppState>) {
    state.virtual_media.stop().await;
}

pub async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(state.virtual_media.status().await)
}
