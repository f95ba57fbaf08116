// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Process-wide shutdown coordination.
//!
//! A single [`ShutdownCoordinator`] is constructed once at process startup and
//! threaded through every long-lived component, avoiding hidden global state.
//! Calling [`ShutdownCoordinator::trigger`] cancels the shared token;
//! components `tokio::select!` against `token.cancelled()` in their run loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;

/// Shared handle passed to every subsystem so it can observe process-wide
/// shutdown without polling a global.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self { token: CancellationToken::new() }
    }

    /// The token components should select against.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Begins the ordered shutdown unwind; idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// True once `trigger` has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Process-wide reference count of active recorders (§3 invariant: "exactly
/// one scale-to-zero guard is held whenever any Recorder is active").
///
/// An external orchestrator (outside this spec's scope) polls
/// [`ScaleToZeroGuard::is_held`] via `/healthz` to decide whether it is safe to
/// suspend the container.
#[derive(Clone, Default)]
pub struct ScaleToZeroGuard {
    count: Arc<AtomicUsize>,
}

/// RAII token returned by [`ScaleToZeroGuard::acquire`]; releases on drop.
#[must_use = "dropping this immediately releases the guard"]
pub struct GuardHandle {
    count: Arc<AtomicUsize>,
}

impl Drop for GuardHandle {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ScaleToZeroGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the reference count; the returned handle decrements it on drop.
    #[must_use]
    pub fn acquire(&self) -> GuardHandle {
        self.count.fetch_add(1, Ordering::AcqRel);
        GuardHandle { count: Arc::clone(&self.count) }
    }

    /// True iff at least one recorder currently holds the guard.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.count.load(Ordering::Acquire) > 0
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let guard = ScaleToZeroGuard::new();
        assert!(!guard.is_held());
        let handle = guard.acquire();
        assert!(guard.is_held());
        assert_eq!(guard.active_count(), 1);
        drop(handle);
        assert!(!guard.is_held());
    }

    #[test]
    fn guard_tracks_multiple_holders() {
        let guard = ScaleToZeroGuard::new();
        let a = guard.acquire();
        let b = guard.acquire();
        assert_eq!(guard.active_count(), 2);
        drop(a);
        assert!(guard.is_held());
        drop(b);
        assert!(!guard.is_held());
    }

    #[tokio::test]
    async fn coordinator_trigger_is_observable() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        assert!(!coordinator.is_shutting_down());
        coordinator.trigger();
        assert!(token.is_cancelled());
        assert!(coordinator.is_shutting_down());
    }
}
