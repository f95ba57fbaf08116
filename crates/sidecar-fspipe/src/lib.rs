// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Bidirectional, ordered, acknowledged binary streaming for mirroring file
//! writes between two hosts: a length-prefixed frame codec, a bounded
//! outbound queue with ack/retry tracking, and a server-side positional-write
//! file registry.

pub mod queue;
pub mod registry;
pub mod session;
pub mod wire;

pub use queue::{OutboundQueue, QueueConfig, RetryOutcome};
pub use registry::FileRegistry;
pub use session::FsPipeSession;
pub use wire::{FileId, Message};
