// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! JSON error body shared by every HTTP endpoint.

use serde::Serialize;
use sidecar_core::SidecarError;

/// `{"error": "<kind>", "message": "<display>"}`, matching the stable kind
/// names on [`SidecarError::kind`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl From<&SidecarError> for ErrorBody {
    fn from(err: &SidecarError) -> Self {
        Self { error: err.kind(), message: err.to_string() }
    }
}
