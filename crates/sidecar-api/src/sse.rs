// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Payload shapes for the server-sent-event feeds. Each is published on its
//! own `SubscriptionHub` and framed by the HTTP layer as `data: <json>\n\n`.

use serde::Serialize;

/// `GET /metrics` (SSE). One event per sampling tick.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp_ms: u64,
    pub cpu_percent: f64,
    pub rss_bytes: u64,
    pub active_recordings: usize,
    pub scale_to_zero_held: bool,
}

/// `GET /clipboard` (SSE). Emitted whenever the container's clipboard content changes.
#[derive(Debug, Clone, Serialize)]
pub struct ClipboardChange {
    pub text: String,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FsWatchKind {
    Created,
    Modified,
    Removed,
}

/// `GET /fs-watch` (SSE). Emitted on every matched filesystem change under a
/// watched root.
#[derive(Debug, Clone, Serialize)]
pub struct FsWatchEvent {
    pub path: String,
    pub kind: FsWatchKind,
    pub timestamp_ms: u64,
}

/// `GET /fspipe/channels` (SSE). Reports traffic on one FsPipe session's
/// outbound queue, keyed by the remote host id.
#[derive(Debug, Clone, Serialize)]
pub struct PipeChannelEvent {
    pub channel: String,
    pub pending_count: usize,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStream {
    Stdout,
    Stderr,
}

/// `GET /process/output` (SSE). One event per captured output line from a
/// supervised child process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutputLine {
    pub pid: i32,
    pub stream: ProcessStream,
    pub line: String,
    pub timestamp_ms: u64,
}
