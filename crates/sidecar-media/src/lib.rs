// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Virtual camera and virtual microphone pipelines driven by supervised
//! `ffmpeg` processes feeding OS-level capture devices.

pub mod command;
pub mod controller;
pub mod targets;

pub use command::{Source, SourceKind};
pub use controller::{ConfigureRequest, ConfigureResult, Status, TrackStatus, VirtualMediaController};
