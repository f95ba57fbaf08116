// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The sidecar binary's composition root: configuration, logging, in-process
//! metrics, and the axum HTTP/SSE/websocket server wiring the five
//! subsystem crates together.

pub mod cli;
pub mod config;
pub mod error;
pub mod fspipe_listener;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod state;

pub use config::Config;
