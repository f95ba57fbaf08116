// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! JSON Lines wire envelopes for the browser debugger protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    pub params: Value,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// A single untyped frame as it comes off the wire: either a response
/// (carries `id` plus `result`/`error`) or an event (carries `method`, no `id`).
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    pub id: Option<u64>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

impl InboundEnvelope {
    #[must_use]
    pub fn is_event(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }
}

/// A dispatched debugger event, scoped to the session it arrived on (if any).
#[derive(Debug, Clone)]
pub struct DebugEvent {
    pub session_id: Option<String>,
    pub method: String,
    pub params: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_envelope_is_not_an_event() {
        let json = r#"{"id":1,"result":{"ok":true}}"#;
        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert!(!env.is_event());
        assert_eq!(env.id, Some(1));
    }

    #[test]
    fn event_envelope_has_no_id() {
        let json = r#"{"method":"Page.loadEventFired","params":{},"sessionId":"S1"}"#;
        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.is_event());
        assert_eq!(env.session_id.as_deref(), Some("S1"));
    }
}
