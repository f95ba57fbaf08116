// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Request/response and event types for the sidecar's HTTP, SSE, and
//! websocket surface. Thin wrappers over the domain crates: where a domain
//! type already has the right wire shape, this crate re-exports it rather
//! than duplicating it.

pub mod domsync;
pub mod error;
pub mod media;
pub mod recording;
pub mod sse;

pub use domsync::DomSyncFrame;
pub use error::ErrorBody;
pub use recording::{
    DeleteRequest, ForceStopRequest, ListRecordingsResponse, RecordingParamsOverride, RecordingSummary,
    SessionIdRequest, StartRecordingRequest, StartRecordingResponse, StopRequest,
};
pub use sse::{ClipboardChange, FsWatchEvent, FsWatchKind, MetricsSnapshot, PipeChannelEvent, ProcessOutputLine, ProcessStream};
