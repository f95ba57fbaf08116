// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Route handlers, grouped by the subsystem they front.

pub mod domsync;
pub mod media;
pub mod recording;
pub mod sse;
