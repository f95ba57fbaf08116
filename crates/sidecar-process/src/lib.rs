// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Process-group supervision: spawn a child detached into its own process
//! group, observe its completion asynchronously, and tear it down with an
//! escalating signal ladder.

pub mod phases;
pub mod supervisor;

pub use phases::{PhasePlan, ShutdownPhase};
pub use supervisor::{ProcessSupervisor, StdioPolicy, WaitResult};
