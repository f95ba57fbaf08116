// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Lifecycle-managed screen-capture sessions: one `ffmpeg` process per
//! session, a small state machine, and a registry keyed by session id.

pub mod command;
pub mod recorder;
pub mod registry;

pub use command::Platform;
pub use recorder::{Metadata, Recorder, RecorderState, RecordingParams};
pub use registry::RecorderRegistry;
