// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `POST /recordings/{start,stop,force_stop,delete}`, `GET /recordings/{list,download}`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use sidecar_api::recording::{
    DeleteRequest, ForceStopRequest, ListRecordingsResponse, RecordingSummary, StartRecordingRequest,
    StartRecordingResponse, StopRequest,
};
use sidecar_core::SidecarError;
use sidecar_recorder::{RecorderState, RecordingParams};
use tokio_util::io::ReaderStream;

use crate::error::ApiError;
use crate::state::AppState;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn generate_id() -> String {
    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    let counter = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("rec-{now_ms:x}-{counter}")
}

fn resolve_params(state: &AppState, id: &str, request: &StartRecordingRequest) -> RecordingParams {
    let defaults = &state.config.recorder;
    RecordingParams {
        frame_rate: request.params.frame_rate.unwrap_or(defaults.default_frame_rate),
        display_index: request.params.display_index.unwrap_or(defaults.default_display_index),
        max_size_mb: request.params.max_size_mb.unwrap_or(defaults.default_max_size_mb),
        max_duration_s: request.params.max_duration_s,
        output_path: defaults.output_dir.join(format!("{id}.mp4")),
    }
}

pub async fn start(
    State(state): State<AppState>,
    Json(request): Json<StartRecordingRequest>,
) -> Result<Json<StartRecordingResponse>, ApiError> {
    let id = request.id.clone().unwrap_or_else(generate_id);
    let params = resolve_params(&state, &id, &request);
    let recorder = state.recorders.start(id.clone(), params).await?;
    let recording_state = recorder.state().await;
    state.metrics.record_active_recordings(state.recorders.list().await.len() as u64);
    Ok(Json(StartRecordingResponse { id, state: recording_state }))
}

pub async fn stop(
    State(state): State<AppState>,
    Json(request): Json<StopRequest>,
) -> Result<(), ApiError> {
    let recorder = state
        .recorders
        .get(&request.id)
        .await
        .ok_or_else(|| SidecarError::NotFound(format!("session '{}' not found", request.id)))?;
    recorder.stop().await?;
    Ok(())
}

pub async fn force_stop(
    State(state): State<AppState>,
    Json(request): Json<ForceStopRequest>,
) -> Result<(), ApiError> {
    let recorder = state
        .recorders
        .get(&request.id)
        .await
        .ok_or_else(|| SidecarError::NotFound(format!("session '{}' not found", request.id)))?;
    recorder.force_stop().await?;
    Ok(())
}

pub async fn delete(
    State(state): State<AppState>,
    Json(request): Json<DeleteRequest>,
) -> Result<(), ApiError> {
    let recorder = state
        .recorders
        .deregister(&request.id)
        .await
        .ok_or_else(|| SidecarError::NotFound(format!("session '{}' not found", request.id)))?;
    let metadata = recorder.metadata().await?;
    tokio::fs::remove_file(&metadata.output_path).await.map_err(SidecarError::Io)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub id: String,
}

pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let recorder = state
        .recorders
        .get(&query.id)
        .await
        .ok_or_else(|| SidecarError::NotFound(format!("session '{}' not found", query.id)))?;
    let (file, _metadata) = recorder.open_recording().await?;
    let stream = ReaderStream::new(file);
    Ok(axum::body::Body::from_stream(stream))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<ListRecordingsResponse>, ApiError> {
    let mut sessions = Vec::new();
    for recorder in state.recorders.list().await {
        let recording_state = recorder.state().await;
        let metadata = if recording_state == RecorderState::Terminated {
            recorder.metadata().await.ok()
        } else {
            None
        };
        sessions.push(RecordingSummary { id: recorder.id().to_string(), state: recording_state, metadata });
    }
    Ok(Json(ListRecordingsResponse { sessions }))
}

#[cfg(test)]
mod tests {
    use super::generate_id;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(a.starts_with("rec-"));
        assert!(b.starts_with("rec-"));
    }
}
