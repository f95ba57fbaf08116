// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Websocket frame envelope for the DOM position sync feed.

use serde::Serialize;
use sidecar_domsync::DomSnapshot;

/// The sole frame shape pushed over `GET /dom-sync` once upgraded to a
/// websocket: `{"event": "dom/sync", "data": <DomSnapshot>}`.
#[derive(Debug, Clone, Serialize)]
pub struct DomSyncFrame {
    pub event: &'static str,
    pub data: DomSnapshot,
}

impl DomSyncFrame {
    #[must_use]
    pub const fn new(data: DomSnapshot) -> Self {
        Self { event: "dom/sync", data }
    }
}
