// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Request/response bodies for the virtual camera / virtual microphone endpoints.
//!
//! Re-exports the domain types directly: there's no wire shape for these that
//! differs from what [`sidecar_media::VirtualMediaController`] already produces.

pub use sidecar_media::{ConfigureRequest, ConfigureResult, Status, TrackStatus};

use serde::Deserialize;

/// `POST /input/devices/virtual/pause` and `/resume`: selects which tracks
/// the call applies to. Both default to `false`, matching a no-op call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackSelection {
    #[serde(default)]
    pub video: bool,
    #[serde(default)]
    pub audio: bool,
}
