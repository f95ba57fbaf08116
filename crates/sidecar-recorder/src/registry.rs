// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Maps session id to [`Recorder`], enforcing id uniqueness and coordinating
//! bulk shutdown.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use sidecar_core::{ScaleToZeroGuard, SidecarError};
use tokio::sync::Mutex;
use tracing::warn;

use crate::recorder::{Recorder, RecordingParams};

/// An id is reserved the instant `start` decides to proceed, before the
/// encoder is spawned, so a second concurrent `start` for the same id sees
/// the reservation rather than an empty slot.
enum Slot {
    Reserved,
    Ready(Arc<Recorder>),
}

/// Owns every active and recently-terminated [`Recorder`].
#[derive(Clone)]
pub struct RecorderRegistry {
    sessions: Arc<Mutex<HashMap<String, Slot>>>,
    scale_to_zero: ScaleToZeroGuard,
}

impl Default for RecorderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { sessions: Arc::new(Mutex::new(HashMap::new())), scale_to_zero: ScaleToZeroGuard::default() }
    }

    /// Starts and registers a new session.
    ///
    /// The id is reserved under a single critical section before the encoder
    /// is spawned, so two concurrent calls with the same id can never both
    /// observe it absent: exactly one reserves it and proceeds, the other
    /// sees the reservation and fails immediately.
    ///
    /// # Errors
    /// Returns [`SidecarError::AlreadyExists`] if `id` is already registered
    /// or reserved, or whatever [`Recorder::start`] returns for a spawn
    /// failure (in which case the reservation is released).
    pub async fn start(
        &self,
        id: String,
        params: RecordingParams,
    ) -> Result<Arc<Recorder>, SidecarError> {
        {
            let mut sessions = self.sessions.lock().await;
            match sessions.entry(id.clone()) {
                Entry::Occupied(_) => {
                    return Err(SidecarError::AlreadyExists(format!("session '{id}' already exists")));
                },
                Entry::Vacant(entry) => {
                    entry.insert(Slot::Reserved);
                },
            }
        }

        match Recorder::start(id.clone(), params, &self.scale_to_zero).await {
            Ok(recorder) => {
                self.sessions.lock().await.insert(id, Slot::Ready(Arc::clone(&recorder)));
                Ok(recorder)
            },
            Err(err) => {
                self.sessions.lock().await.remove(&id);
                Err(err)
            },
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Recorder>> {
        match self.sessions.lock().await.get(id) {
            Some(Slot::Ready(recorder)) => Some(Arc::clone(recorder)),
            _ => None,
        }
    }

    pub async fn list(&self) -> Vec<Arc<Recorder>> {
        self.sessions
            .lock()
            .await
            .values()
            .filter_map(|slot| match slot {
                Slot::Ready(recorder) => Some(Arc::clone(recorder)),
                Slot::Reserved => None,
            })
            .collect()
    }

    pub async fn deregister(&self, id: &str) -> Option<Arc<Recorder>> {
        match self.sessions.lock().await.remove(id) {
            Some(Slot::Ready(recorder)) => Some(recorder),
            _ => None,
        }
    }

    /// Stops every active session concurrently, returning any failures keyed
    /// by session id.
    pub async fn stop_all(&self) -> Vec<(String, SidecarError)> {
        let sessions: Vec<Arc<Recorder>> = self
            .sessions
            .lock()
            .await
            .values()
            .filter_map(|slot| match slot {
                Slot::Ready(recorder) => Some(Arc::clone(recorder)),
                Slot::Reserved => None,
            })
            .collect();

        let results = futures::future::join_all(sessions.into_iter().map(|recorder| async move {
            let id = recorder.id().to_string();
            (id, recorder.stop().await)
        }))
        .await;

        let mut failures = Vec::new();
        for (id, result) in results {
            if let Err(err) = result {
                warn!(id, error = %err, "failed to stop session during StopAll");
                failures.push((id, err));
            }
        }
        failures
    }

    #[must_use]
    pub fn scale_to_zero(&self) -> &ScaleToZeroGuard {
        &self.scale_to_zero
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn params() -> RecordingParams {
        RecordingParams {
            frame_rate: 5,
            display_index: 0,
            max_size_mb: 1,
            max_duration_s: None,
            output_path: PathBuf::from("/tmp/sidecar-recorder-tests/unused.mp4"),
        }
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let registry = RecorderRegistry::new();
        // Seed a fake entry without going through Recorder::start (which
        // would try to spawn a real ffmpeg process).
        let dir = tempfile::tempdir().unwrap();
        let mut p = params();
        p.output_path = dir.path().join("dup.mp4");

        let Ok(recorder) = Recorder::start("dup".to_string(), p.clone(), registry.scale_to_zero()).await
        else {
            return; // no ffmpeg on this host; nothing to assert
        };
        registry.sessions.lock().await.insert("dup".to_string(), Slot::Ready(recorder));

        let err = registry.start("dup".to_string(), p).await.unwrap_err();
        assert!(matches!(err, SidecarError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn reserved_slot_blocks_concurrent_start() {
        // Simulates the window between a concurrent caller reserving an id
        // and that caller's `Recorder::start` completing: the reservation
        // alone must be enough to reject a second `start` for the same id,
        // with no `Recorder::start` attempted.
        let registry = RecorderRegistry::new();
        registry.sessions.lock().await.insert("dup".to_string(), Slot::Reserved);

        let err = registry.start("dup".to_string(), params()).await.unwrap_err();
        assert!(matches!(err, SidecarError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn failed_start_releases_the_reservation() {
        let registry = RecorderRegistry::new();
        let mut p = params();
        p.output_path = PathBuf::from("/dev/null/not-a-real-directory/out.mp4");

        // Whatever Recorder::start does with this host (succeed or fail), the
        // reservation must not be left behind on failure.
        if registry.start("retry".to_string(), p.clone()).await.is_err() {
            assert!(registry.sessions.lock().await.get("retry").is_none());
        }
    }
}
