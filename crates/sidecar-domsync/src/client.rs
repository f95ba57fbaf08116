// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Single multiplexed connection to the browser's debugging protocol.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use sidecar_core::{OverflowPolicy, Replay, SidecarError, SubscriptionHub};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::wire::{DebugEvent, InboundEnvelope, Request};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<Value, SidecarError>>>>;
type Writer =
    futures_util::stream::SplitSink<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// A single websocket connection to the browser debugger, multiplexing
/// request/response by id and dispatching events by (session id, method).
pub struct DebugProtocolClient {
    writer: Mutex<Writer>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    events: SubscriptionHub<DebugEvent>,
    closed: Arc<AtomicBool>,
}

impl DebugProtocolClient {
    /// Dials `url` and starts the background read/dispatch loop.
    ///
    /// # Errors
    /// Returns [`SidecarError::Transient`] if the websocket handshake fails.
    pub async fn connect(url: &str) -> Result<Self, SidecarError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|err| SidecarError::Transient(format!("debugger connect failed: {err}")))?;
        let (writer, mut reader) = stream.split();

        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let events = SubscriptionHub::new();
        let closed = Arc::new(AtomicBool::new(false));

        {
            let pending = Arc::clone(&pending);
            let events = events.clone();
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                while let Some(message) = reader.next().await {
                    match message {
                        Ok(Message::Text(text)) => dispatch_frame(&text, &pending, &events).await,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {},
                        Err(err) => {
                            warn!(error = %err, "debugger websocket read error");
                            break;
                        },
                    }
                }
                closed.store(true, Ordering::SeqCst);
                events.close();
                fail_all_pending(&pending).await;
                debug!("debugger connection closed");
            });
        }

        Ok(Self { writer: Mutex::new(writer), pending, next_id: AtomicU64::new(1), events, closed })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribes to every dispatched debugger event; callers filter by
    /// session id / method themselves.
    #[must_use]
    pub fn subscribe_events(&self, capacity: usize) -> Option<sidecar_core::Subscription<DebugEvent>> {
        self.events.subscribe(capacity, OverflowPolicy::DropOldest, Replay::None)
    }

    /// Issues a request and awaits its response, failing with
    /// [`SidecarError::Transient`] after 10s or on a debugger-reported error.
    ///
    /// # Errors
    /// Returns `Transient` on timeout, write failure, or a remote error payload.
    pub async fn call(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value, SidecarError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = Request {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(str::to_string),
        };
        let payload = serde_json::to_string(&request)
            .map_err(|err| SidecarError::InvalidArgument(format!("bad request payload: {err}")))?;

        if let Err(err) = self.writer.lock().await.send(Message::Text(payload.into())).await {
            self.pending.lock().await.remove(&id);
            return Err(SidecarError::Transient(format!("debugger write failed: {err}")));
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SidecarError::Transient("debugger connection closed mid-call".to_string())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(SidecarError::Transient(format!("debugger call '{method}' timed out")))
            },
        }
    }
}

async fn dispatch_frame(text: &str, pending: &PendingMap, events: &SubscriptionHub<DebugEvent>) {
    let envelope: InboundEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "failed to parse debugger frame");
            return;
        },
    };

    if envelope.is_event() {
        let method = envelope.method.unwrap_or_default();
        events.publish(DebugEvent {
            session_id: envelope.session_id,
            method,
            params: envelope.params,
        });
        return;
    }

    let Some(id) = envelope.id else {
        debug!("dropping frame with neither id nor method");
        return;
    };

    let Some(sender) = pending.lock().await.remove(&id) else {
        debug!(id, "dropping response for unknown request id");
        return;
    };

    let result = if let Some(error) = envelope.error {
        Err(SidecarError::Transient(format!("debugger error {}: {}", error.code, error.message)))
    } else {
        Ok(envelope.result.unwrap_or(Value::Null))
    };
    let _ = sender.send(result);
}

async fn fail_all_pending(pending: &PendingMap) {
    for (_, sender) in pending.lock().await.drain() {
        let _ = sender.send(Err(SidecarError::Transient("debugger connection closed".to_string())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_timeout_constant_is_ten_seconds() {
        assert_eq!(CALL_TIMEOUT, Duration::from_secs(10));
    }
}
