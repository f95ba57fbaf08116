// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shutdown escalation plans.
//!
//! A [`PhasePlan`] is an ordered list of `{signals, timeout}` phases.
//! [`ProcessSupervisor::shutdown`](crate::ProcessSupervisor::shutdown) walks
//! them in order, sending every signal in a phase to the whole process group
//! and waiting up to that phase's timeout for termination before escalating.

use std::time::Duration;

use nix::sys::signal::Signal;

/// One step of an escalation ladder.
#[derive(Debug, Clone)]
pub struct ShutdownPhase {
    pub signals: Vec<Signal>,
    pub timeout: Duration,
}

impl ShutdownPhase {
    #[must_use]
    pub fn new(signals: Vec<Signal>, timeout: Duration) -> Self {
        Self { signals, timeout }
    }
}

/// An ordered escalation ladder passed to `ProcessSupervisor::shutdown`.
#[derive(Debug, Clone)]
pub struct PhasePlan(pub Vec<ShutdownPhase>);

impl PhasePlan {
    /// `[(CONT+INT, 5s), (INT, 3s), (TERM, 250ms), (KILL, 100ms)]`.
    ///
    /// The initial `CONT` defends against a paused child; `INT` is sent twice
    /// because some encoders ignore the first while flushing a fragment.
    #[must_use]
    pub fn graceful() -> Self {
        Self(vec![
            ShutdownPhase::new(
                vec![Signal::SIGCONT, Signal::SIGINT],
                Duration::from_secs(5),
            ),
            ShutdownPhase::new(vec![Signal::SIGINT], Duration::from_secs(3)),
            ShutdownPhase::new(vec![Signal::SIGTERM], Duration::from_millis(250)),
            ShutdownPhase::new(vec![Signal::SIGKILL], Duration::from_millis(100)),
        ])
    }

    /// `[(KILL, 100ms)]`.
    #[must_use]
    pub fn immediate() -> Self {
        Self(vec![ShutdownPhase::new(vec![Signal::SIGKILL], Duration::from_millis(100))])
    }

    #[must_use]
    pub fn phases(&self) -> &[ShutdownPhase] {
        &self.0
    }
}
