// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Debugger-protocol client and DOM element position sync bridge: attaches to
//! the browser's remote-debugging websocket, injects an observer script into
//! the active page, and republishes its reports as [`DomSnapshot`] events.

pub mod client;
pub mod manager;
pub mod observer;
pub mod snapshot;
pub mod wire;

pub use client::DebugProtocolClient;
pub use manager::DomSyncManager;
pub use observer::OBSERVER_SCRIPT;
pub use snapshot::{Category, DomElement, DomSnapshot, Viewport, WindowBounds};
pub use wire::DebugEvent;
