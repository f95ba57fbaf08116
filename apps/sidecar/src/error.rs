// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Maps [`SidecarError`] onto HTTP status codes and the `{error, message}`
//! JSON body, per the error-handling design's status table.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sidecar_core::SidecarError;
use sidecar_api::ErrorBody;

pub struct ApiError(pub SidecarError);

impl From<SidecarError> for ApiError {
    fn from(err: SidecarError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SidecarError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            SidecarError::AlreadyExists(_) => StatusCode::CONFLICT,
            SidecarError::NotFound(_) => StatusCode::NOT_FOUND,
            SidecarError::NotReady(_) => StatusCode::CONFLICT,
            SidecarError::SpawnFailed(_)
            | SidecarError::ShutdownTimeout(_)
            | SidecarError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SidecarError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            SidecarError::Canceled(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}
