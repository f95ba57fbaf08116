// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Drives OS-level virtual camera and virtual microphone devices from remote
//! sources via supervised `ffmpeg` pipelines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sidecar_core::SidecarError;
use sidecar_process::{PhasePlan, ProcessSupervisor, StdioPolicy};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::command::{build_audio_args, build_video_args, Source};
use crate::targets::{ensure_audio_sink, ensure_video_device, DEFAULT_AUDIO_SINK, DEFAULT_VIDEO_DEVICE};

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

/// A request to (re)configure zero, one, or two tracks. `None` leaves that
/// track untouched if already absent, but [`VirtualMediaController::configure`]
/// always stops any existing track before applying the request, matching the
/// atomic-swap contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureRequest {
    pub video: Option<Source>,
    pub audio: Option<Source>,
}

/// Resolved device/sink paths after a successful [`VirtualMediaController::configure`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigureResult {
    pub video_target: Option<String>,
    pub audio_target: Option<String>,
}

/// Point-in-time status of one track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackStatus {
    pub active: bool,
    pub paused: bool,
    pub pid: i32,
    pub source_url: String,
    pub started_at_ms: u64,
    pub last_error: Option<String>,
}

/// Controller-wide status snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Status {
    pub video: Option<TrackStatus>,
    pub audio: Option<TrackStatus>,
}

struct Track {
    source: Source,
    target: String,
    supervisor: ProcessSupervisor,
    paused: AtomicBool,
    started_at_ms: u64,
}

impl Track {
    fn status(&self) -> TrackStatus {
        let last_error = self.supervisor.completion().and_then(|wait| {
            let failed = wait.exit_code.is_some_and(|code| code != 0) || wait.signalled_by.is_some();
            failed.then(|| {
                format!(
                    "ffmpeg exited unexpectedly (code={:?}, signal={:?})",
                    wait.exit_code, wait.signalled_by
                )
            })
        });

        TrackStatus {
            active: self.supervisor.is_running(),
            paused: self.paused.load(Ordering::SeqCst),
            pid: self.supervisor.pid(),
            source_url: self.source.url.clone(),
            started_at_ms: self.started_at_ms,
            last_error,
        }
    }

    async fn stop(&self) {
        if let Err(err) = self.supervisor.shutdown(&PhasePlan::graceful()).await {
            warn!(error = %err, "virtual media track did not stop cleanly");
        }
    }
}

fn validate_source(source: &Source) -> Result<(), SidecarError> {
    if source.url.trim().is_empty() {
        return Err(SidecarError::InvalidArgument("track source url must not be empty".to_string()));
    }
    Ok(())
}

async fn start_video_track(source: Source) -> Result<Track, SidecarError> {
    validate_source(&source)?;
    ensure_video_device(DEFAULT_VIDEO_DEVICE).await?;
    let args = build_video_args(&source, DEFAULT_VIDEO_DEVICE);
    let supervisor = ProcessSupervisor::start("ffmpeg", &args, StdioPolicy::Null)?;
    Ok(Track {
        source,
        target: DEFAULT_VIDEO_DEVICE.to_string(),
        supervisor,
        paused: AtomicBool::new(false),
        started_at_ms: now_ms(),
    })
}

async fn start_audio_track(source: Source) -> Result<Track, SidecarError> {
    validate_source(&source)?;
    ensure_audio_sink(DEFAULT_AUDIO_SINK).await?;
    let args = build_audio_args(&source, DEFAULT_AUDIO_SINK);
    let supervisor = ProcessSupervisor::start("ffmpeg", &args, StdioPolicy::Null)?;
    Ok(Track {
        source,
        target: DEFAULT_AUDIO_SINK.to_string(),
        supervisor,
        paused: AtomicBool::new(false),
        started_at_ms: now_ms(),
    })
}

/// Owns at most one video and one audio track. `configure` is atomic:
/// either both requested tracks start, or none remain.
#[derive(Default)]
pub struct VirtualMediaController {
    video: Mutex<Option<Arc<Track>>>,
    audio: Mutex<Option<Arc<Track>>>,
}

impl VirtualMediaController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops any existing tracks, validates and starts the requested ones,
    /// and rolls back everything started during this call if any start fails.
    ///
    /// # Errors
    /// Returns [`SidecarError::InvalidArgument`] for a malformed source, or
    /// whatever the underlying pipeline start failed with; in both cases the
    /// controller is left with no active tracks.
    pub async fn configure(&self, request: ConfigureRequest) -> Result<ConfigureResult, SidecarError> {
        self.stop().await;

        let mut started: Vec<(bool, Track)> = Vec::new();
        let mut result = ConfigureResult::default();

        if let Some(source) = request.video {
            match start_video_track(source).await {
                Ok(track) => {
                    result.video_target = Some(track.target.clone());
                    started.push((true, track));
                },
                Err(err) => {
                    self.rollback(started).await;
                    return Err(err);
                },
            }
        }

        if let Some(source) = request.audio {
            match start_audio_track(source).await {
                Ok(track) => {
                    result.audio_target = Some(track.target.clone());
                    started.push((false, track));
                },
                Err(err) => {
                    self.rollback(started).await;
                    return Err(err);
                },
            }
        }

        for (is_video, track) in started {
            let slot = if is_video { &self.video } else { &self.audio };
            *slot.lock().await = Some(Arc::new(track));
        }

        info!("virtual media configured");
        Ok(result)
    }

    async fn rollback(&self, started: Vec<(bool, Track)>) {
        for (_, track) in started {
            track.stop().await;
        }
    }

    /// Sends `SIGSTOP` to the selected tracks' process groups; no-op for a
    /// track already paused or inactive.
    pub async fn pause(&self, video: bool, audio: bool) {
        if video {
            if let Some(track) = self.video.lock().await.as_ref() {
                track.supervisor.pause();
                track.paused.store(true, Ordering::SeqCst);
            }
        }
        if audio {
            if let Some(track) = self.audio.lock().await.as_ref() {
                track.supervisor.pause();
                track.paused.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Sends `SIGCONT` to the selected tracks' process groups.
    pub async fn resume(&self, video: bool, audio: bool) {
        if video {
            if let Some(track) = self.video.lock().await.as_ref() {
                track.supervisor.resume();
                track.paused.store(false, Ordering::SeqCst);
            }
        }
        if audio {
            if let Some(track) = self.audio.lock().await.as_ref() {
                track.supervisor.resume();
                track.paused.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Terminates both tracks and leaves the controller empty.
    pub async fn stop(&self) {
        if let Some(track) = self.video.lock().await.take() {
            track.stop().await;
        }
        if let Some(track) = self.audio.lock().await.take() {
            track.stop().await;
        }
    }

    pub async fn status(&self) -> Status {
        Status {
            video: self.video.lock().await.as_ref().map(|t| t.status()),
            audio: self.audio.lock().await.as_ref().map(|t| t.status()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::command::SourceKind;

    use super::*;

    #[tokio::test]
    async fn configure_rejects_empty_url() {
        let controller = VirtualMediaController::new();
        let request = ConfigureRequest {
            video: None,
            audio: Some(Source { url: String::new(), kind: SourceKind::Stream, looped: false }),
        };
        let err = controller.configure(request).await.unwrap_err();
        assert!(matches!(err, SidecarError::InvalidArgument(_)));

        let status = controller.status().await;
        assert!(status.video.is_none());
        assert!(status.audio.is_none());
    }

    #[tokio::test]
    async fn status_is_empty_by_default() {
        let controller = VirtualMediaController::new();
        let status = controller.status().await;
        assert!(status.video.is_none() && status.audio.is_none());
    }
}
