// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Request/response bodies for the screen-recording endpoints.

use serde::{Deserialize, Serialize};
use sidecar_recorder::{Metadata, RecorderState};

/// Overrides layered onto the server's default [`sidecar_recorder::RecordingParams`].
/// Any field left `None` keeps the server default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingParamsOverride {
    pub frame_rate: Option<u32>,
    pub display_index: Option<u32>,
    pub max_size_mb: Option<u64>,
    pub max_duration_s: Option<u64>,
}

/// `POST /recordings/start`
#[derive(Debug, Clone, Deserialize)]
pub struct StartRecordingRequest {
    /// Client-chosen session id; the server assigns one if absent.
    pub id: Option<String>,
    #[serde(default)]
    pub params: RecordingParamsOverride,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartRecordingResponse {
    pub id: String,
    pub state: RecorderState,
}

/// Shared body shape for `/stop`, `/force_stop`, and `/delete`: they all key
/// off one session id.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionIdRequest {
    pub id: String,
}

pub type StopRequest = SessionIdRequest;
pub type ForceStopRequest = SessionIdRequest;
pub type DeleteRequest = SessionIdRequest;

/// `GET /recordings/list` entry.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummary {
    pub id: String,
    pub state: RecorderState,
    /// Present once the session has reached [`RecorderState::Terminated`].
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListRecordingsResponse {
    pub sessions: Vec<RecordingSummary>,
}
