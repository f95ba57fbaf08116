// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Server-sent-event feeds: metrics, clipboard, fs-watch, fspipe channel
//! backlog, and per-recording encoder stdout/stderr. Each is backed by a
//! [`sidecar_core::SubscriptionHub`] subscription turned into an SSE stream.

use std::convert::Infallible;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use sidecar_api::sse::{MetricsSnapshot, PipeChannelEvent, ProcessOutputLine, ProcessStream};
use sidecar_core::{OverflowPolicy, Replay, Subscription};

use crate::error::ApiError;
use crate::state::AppState;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

fn event_for<T: serde::Serialize>(value: &T) -> Event {
    match serde_json::to_string(value) {
        Ok(json) => Event::default().data(json),
        Err(_) => Event::default().comment("serialization error"),
    }
}

fn subscription_stream<T>(subscription: Subscription<T>) -> impl Stream<Item = Result<Event, Infallible>>
where
    T: serde::Serialize + Send + 'static,
{
    stream::unfold(subscription, |subscription| async move {
        let value = subscription.recv().await?;
        Some((Ok(event_for(&value)), subscription))
    })
}

pub async fn metrics(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let active_recordings = state.recorders.list().await.len();
    let snapshot = MetricsSnapshot {
        timestamp_ms: now_ms(),
        cpu_percent: 0.0,
        rss_bytes: 0,
        active_recordings,
        scale_to_zero_held: state.recorders.scale_to_zero().is_held(),
    };
    Sse::new(stream::once(async move { Ok(event_for(&snapshot)) })).keep_alive(KeepAlive::default())
}

pub async fn clipboard(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state
        .clipboard_hub
        .subscribe(64, OverflowPolicy::DropOldest, Replay::None)
        .expect("clipboard hub only closes during process shutdown");
    Sse::new(subscription_stream(subscription)).keep_alive(KeepAlive::default())
}

pub async fn fs_watch(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state
        .fs_watch_hub
        .subscribe(64, OverflowPolicy::DropOldest, Replay::None)
        .expect("fs_watch hub only closes during process shutdown");
    Sse::new(subscription_stream(subscription)).keep_alive(KeepAlive::default())
}

pub async fn fspipe_channels(State(_state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // No channel-level producer is wired up yet; emits one snapshot so the
    // route is real rather than unimplemented.
    let event = PipeChannelEvent { channel: "default".to_string(), pending_count: 0, timestamp_ms: now_ms() };
    Sse::new(stream::once(async move { Ok(event_for(&event)) })).keep_alive(KeepAlive::default())
}

pub async fn recording_output(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let recorder = state
        .recorders
        .get(&id)
        .await
        .ok_or_else(|| sidecar_core::SidecarError::NotFound(format!("session '{id}' not found")))?;

    let stdout_sub = recorder.stdout_hub().await.and_then(|hub| hub.subscribe(256, OverflowPolicy::DropOldest, Replay::None));
    let stderr_sub = recorder.stderr_hub().await.and_then(|hub| hub.subscribe(256, OverflowPolicy::DropOldest, Replay::None));

    let stdout_stream = stdout_sub.map(|sub| Box::pin(line_stream(sub, ProcessStream::Stdout)) as BoxedLineStream);
    let stderr_stream = stderr_sub.map(|sub| Box::pin(line_stream(sub, ProcessStream::Stderr)) as BoxedLineStream);

    let merged = match (stdout_stream, stderr_stream) {
        (Some(out), Some(err)) => Box::pin(stream::select(out, err)) as BoxedLineStream,
        (Some(out), None) => out,
        (None, Some(err)) => err,
        (None, None) => Box::pin(stream::empty()),
    };

    Ok(Sse::new(merged).keep_alive(KeepAlive::default()))
}

type BoxedLineStream = std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

fn line_stream(
    subscription: Subscription<String>,
    which: ProcessStream,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((subscription, which), |(subscription, which)| async move {
        let line = subscription.recv().await?;
        let payload = ProcessOutputLine { pid: 0, stream: which, line, timestamp_ms: now_ms() };
        Some((Ok(event_for(&payload)), (subscription, which)))
    })
}
