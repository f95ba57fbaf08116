// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Keeps the current attached page target fed into a live `DomSnapshot` stream.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use sidecar_core::{OverflowPolicy, Replay, Subscription, SubscriptionHub};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::DebugProtocolClient;
use crate::observer::OBSERVER_SCRIPT;
use crate::snapshot::{build_snapshot, CompactPayload, DomSnapshot};
use crate::wire::DebugEvent;

const BINDING_NAME: &str = "__domSyncCallback__";
const THROTTLE_WINDOW: Duration = Duration::from_millis(100);
const REDISCOVER_DELAY: Duration = Duration::from_millis(500);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const LOAD_REEVAL_DELAY: Duration = Duration::from_millis(10);
const NAV_REEVAL_DELAY: Duration = Duration::from_millis(25);

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

enum Signal {
    ReEvaluate,
    FlushThrottle,
    Rediscover,
}

/// Owns the debugger connection lifecycle and broadcasts DOM snapshots.
pub struct DomSyncManager {
    hub: SubscriptionHub<DomSnapshot>,
}

impl DomSyncManager {
    /// Spawns the reconnect-forever background task and returns a handle.
    /// `cancel` stops the manager; the hub is closed once the task exits.
    #[must_use]
    pub fn spawn(debugger_url: String, cancel: CancellationToken) -> Arc<Self> {
        let hub = SubscriptionHub::new();
        let manager = Arc::new(Self { hub: hub.clone() });
        tokio::spawn(reconnect_loop(debugger_url, hub, cancel));
        manager
    }

    #[must_use]
    pub fn subscribe(&self, capacity: usize) -> Option<Subscription<DomSnapshot>> {
        self.hub.subscribe(capacity, OverflowPolicy::DropOldest, Replay::LastValue)
    }

    #[must_use]
    pub fn last_snapshot(&self) -> Option<DomSnapshot> {
        self.hub.last_value()
    }
}

async fn reconnect_loop(url: String, hub: SubscriptionHub<DomSnapshot>, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            hub.close();
            return;
        }

        match DebugProtocolClient::connect(&url).await {
            Ok(client) => run_session(&client, &hub, &cancel).await,
            Err(err) => warn!(error = %err, "failed to connect to debugger"),
        }

        if cancel.is_cancelled() {
            hub.close();
            return;
        }

        tokio::select! {
            () = sleep(RECONNECT_DELAY) => {},
            () = cancel.cancelled() => { hub.close(); return; },
        }
    }
}

async fn run_session(client: &DebugProtocolClient, hub: &SubscriptionHub<DomSnapshot>, cancel: &CancellationToken) {
    let Some(mut events) = client.subscribe_events(64) else {
        return;
    };

    loop {
        if cancel.is_cancelled() || client.is_closed() {
            return;
        }

        let Some((target_id, session_id)) = discover_and_attach(client, cancel).await else {
            return;
        };

        if let Err(err) = enable_session(client, &session_id).await {
            warn!(error = %err, "failed to enable debugger domains on session");
            continue;
        }

        info!(target_id, session_id, "dom-sync attached to page target");
        run_attached(client, hub, &mut events, &target_id, &session_id, cancel).await;
    }
}

/// Runs discovery with a 500ms retry until a page target appears, then
/// attaches in flat mode. Returns `None` if cancelled or the client closed.
async fn discover_and_attach(
    client: &DebugProtocolClient,
    cancel: &CancellationToken,
) -> Option<(String, String)> {
    loop {
        if cancel.is_cancelled() || client.is_closed() {
            return None;
        }

        let _ = client.call(None, "Target.setDiscoverTargets", json!({"discover": true})).await;
        let targets = client.call(None, "Target.getTargets", json!({})).await.ok()?;
        let target_id = find_first_page_target(&targets);

        if let Some(target_id) = target_id {
            let attach = client
                .call(None, "Target.attachToTarget", json!({"targetId": target_id, "flatten": true}))
                .await
                .ok()?;
            let session_id = attach.get("sessionId")?.as_str()?.to_string();
            return Some((target_id, session_id));
        }

        tokio::select! {
            () = sleep(REDISCOVER_DELAY) => {},
            () = cancel.cancelled() => return None,
        }
    }
}

fn find_first_page_target(targets: &Value) -> Option<String> {
    targets
        .get("targetInfos")?
        .as_array()?
        .iter()
        .find(|t| t.get("type").and_then(Value::as_str) == Some("page"))
        .and_then(|t| t.get("targetId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

async fn enable_session(client: &DebugProtocolClient, session_id: &str) -> Result<(), sidecar_core::SidecarError> {
    client.call(Some(session_id), "Runtime.enable", json!({})).await?;
    client.call(Some(session_id), "Page.enable", json!({})).await?;
    client.call(Some(session_id), "Runtime.addBinding", json!({"name": BINDING_NAME})).await?;
    client
        .call(Some(session_id), "Page.addScriptToEvaluateOnNewDocument", json!({"source": OBSERVER_SCRIPT}))
        .await?;
    client.call(Some(session_id), "Runtime.evaluate", json!({"expression": OBSERVER_SCRIPT})).await?;
    Ok(())
}

/// Processes debugger events for the current attachment until it is lost
/// (target destroyed/detached), the client closes, or shutdown is requested.
async fn run_attached(
    client: &DebugProtocolClient,
    hub: &SubscriptionHub<DomSnapshot>,
    events: &mut Subscription<DebugEvent>,
    target_id: &str,
    session_id: &str,
    cancel: &CancellationToken,
) {
    let (signal_tx, mut signal_rx) = mpsc::channel::<Signal>(16);
    let mut seq: u64 = 0;
    let mut pending: Option<DomSnapshot> = None;
    let mut throttle_armed = false;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            event = events.recv() => {
                let Some(event) = event else { return };
                if !event_belongs_to_session(&event, session_id) {
                    continue;
                }
                match event.method.as_str() {
                    "Runtime.bindingCalled" => {
                        handle_binding_called(&event, hub, &signal_tx, &mut seq, &mut pending, &mut throttle_armed).await;
                    },
                    "Page.loadEventFired" | "Page.domContentEventFired" => {
                        schedule(&signal_tx, Signal::ReEvaluate, LOAD_REEVAL_DELAY);
                    },
                    "Page.frameNavigated" => {
                        schedule(&signal_tx, Signal::ReEvaluate, NAV_REEVAL_DELAY);
                    },
                    "Target.targetDestroyed" => {
                        if event.params.get("targetId").and_then(Value::as_str) == Some(target_id) {
                            schedule(&signal_tx, Signal::Rediscover, REDISCOVER_DELAY);
                        }
                    },
                    "Target.detachedFromTarget" => {
                        if event.params.get("sessionId").and_then(Value::as_str) == Some(session_id) {
                            return;
                        }
                    },
                    _ => {},
                }
            },
            Some(signal) = signal_rx.recv() => {
                match signal {
                    Signal::ReEvaluate => {
                        let _ = client
                            .call(Some(session_id), "Runtime.evaluate", json!({"expression": OBSERVER_SCRIPT}))
                            .await;
                    },
                    Signal::FlushThrottle => {
                        throttle_armed = false;
                        if let Some(snapshot) = pending.take() {
                            hub.publish(snapshot);
                        }
                    },
                    Signal::Rediscover => return,
                }
            },
        }
    }
}

fn event_belongs_to_session(event: &DebugEvent, session_id: &str) -> bool {
    // Target lifecycle events arrive on the browser-level (no session id);
    // everything else must match the current attachment.
    matches!(
        event.method.as_str(),
        "Target.targetDestroyed" | "Target.detachedFromTarget" | "Target.targetCreated" | "Target.targetInfoChanged"
    ) || event.session_id.as_deref() == Some(session_id)
}

fn schedule(tx: &mpsc::Sender<Signal>, signal: Signal, delay: Duration) {
    let tx = tx.clone();
    tokio::spawn(async move {
        sleep(delay).await;
        let _ = tx.send(signal).await;
    });
}

async fn handle_binding_called(
    event: &DebugEvent,
    hub: &SubscriptionHub<DomSnapshot>,
    signal_tx: &mpsc::Sender<Signal>,
    seq: &mut u64,
    pending: &mut Option<DomSnapshot>,
    throttle_armed: &mut bool,
) {
    if event.params.get("name").and_then(Value::as_str) != Some(BINDING_NAME) {
        return;
    }
    let Some(payload_str) = event.params.get("payload").and_then(Value::as_str) else {
        return;
    };
    let payload: CompactPayload = match serde_json::from_str(payload_str) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(error = %err, "failed to parse observer payload");
            return;
        },
    };

    *seq += 1;
    let snapshot = build_snapshot(payload, *seq, now_ms());

    if *throttle_armed {
        *pending = Some(snapshot);
        return;
    }

    hub.publish(snapshot);
    *throttle_armed = true;
    schedule(signal_tx, Signal::FlushThrottle, THROTTLE_WINDOW);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::DebugEvent;

    #[test]
    fn find_first_page_target_skips_non_page_types() {
        let targets = json!({
            "targetInfos": [
                {"type": "browser", "targetId": "b1"},
                {"type": "page", "targetId": "p1"},
                {"type": "page", "targetId": "p2"},
            ],
        });
        assert_eq!(find_first_page_target(&targets).as_deref(), Some("p1"));
    }

    #[test]
    fn find_first_page_target_none_when_absent() {
        let targets = json!({"targetInfos": [{"type": "service_worker", "targetId": "s1"}]});
        assert_eq!(find_first_page_target(&targets), None);
    }

    #[test]
    fn event_belongs_to_session_accepts_matching_session() {
        let event = DebugEvent {
            session_id: Some("s1".to_string()),
            method: "Runtime.bindingCalled".to_string(),
            params: json!({}),
        };
        assert!(event_belongs_to_session(&event, "s1"));
        assert!(!event_belongs_to_session(&event, "s2"));
    }

    #[test]
    fn event_belongs_to_session_always_accepts_target_lifecycle_events() {
        let event = DebugEvent { session_id: None, method: "Target.targetDestroyed".to_string(), params: json!({}) };
        assert!(event_belongs_to_session(&event, "any-session"));
    }

    #[tokio::test]
    async fn binding_called_throttles_second_snapshot_within_window() {
        let hub: SubscriptionHub<DomSnapshot> = SubscriptionHub::new();
        let (signal_tx, _signal_rx) = mpsc::channel::<Signal>(16);
        let mut seq = 0;
        let mut pending = None;
        let mut throttle_armed = false;

        let payload = json!({
            "v": {"w": 100.0, "h": 200.0},
            "e": [],
            "b": {"x": 0.0, "y": 0.0, "w": 100.0, "h": 200.0, "ct": 0.0, "cl": 0.0, "fs": true},
            "u": "https://example.com",
        });
        let event = DebugEvent {
            session_id: Some("s1".to_string()),
            method: "Runtime.bindingCalled".to_string(),
            params: json!({"name": BINDING_NAME, "payload": payload.to_string()}),
        };

        handle_binding_called(&event, &hub, &signal_tx, &mut seq, &mut pending, &mut throttle_armed).await;
        assert!(throttle_armed);
        assert!(pending.is_none());
        assert_eq!(hub.last_value().map(|s| s.seq), Some(1));

        handle_binding_called(&event, &hub, &signal_tx, &mut seq, &mut pending, &mut throttle_armed).await;
        assert!(pending.is_some());
        // Still the first snapshot published; the second is held back by the throttle.
        assert_eq!(hub.last_value().map(|s| s.seq), Some(1));
    }
}
