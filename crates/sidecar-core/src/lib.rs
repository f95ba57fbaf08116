// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared error taxonomy, subscription fan-out, shutdown coordination, and
//! common geometry types used across every sidecar subsystem crate.

pub mod cancel;
pub mod error;
pub mod geometry;
pub mod hub;

pub use cancel::{GuardHandle, ScaleToZeroGuard, ShutdownCoordinator};
pub use error::{Result, SidecarError};
pub use geometry::Rect;
pub use hub::{OverflowPolicy, Replay, Subscription, SubscriptionHub};
