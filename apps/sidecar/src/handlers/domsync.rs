// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! `GET /dom-sync` — websocket upgrade streaming [`DomSyncFrame`]s.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use sidecar_api::domsync::DomSyncFrame;
use tracing::debug;

use crate::state::AppState;

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_snapshots(socket, state))
}

async fn stream_snapshots(mut socket: WebSocket, state: AppState) {
    let Some(mut subscription) = state.dom_sync.subscribe(32) else {
        let _ = socket.close().await;
        return;
    };

    loop {
        tokio::select! {
            snapshot = subscription.recv() => {
                let Some(snapshot) = snapshot else { break };
                let frame = DomSyncFrame::new(snapshot);
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
                state.metrics.record_dom_broadcast();
            },
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {},
                    Some(Err(err)) => {
                        debug!(error = %err, "dom-sync websocket read error");
                        break;
                    },
                }
            },
        }
    }
}
