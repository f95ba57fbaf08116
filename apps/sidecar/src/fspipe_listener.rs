// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Accepts FsPipe connections and spawns one [`FsPipeSession`] per peer,
//! applying inbound writes against the shared [`FileRegistry`].

use std::time::Duration;

use sidecar_fspipe::{session, FsPipeSession};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::FsPipeConfig;
use crate::state::AppState;

/// Runs until `cancel` fires; each accepted connection runs independently and
/// is not waited on.
pub async fn run(config: &FsPipeConfig, state: AppState, cancel: CancellationToken) {
    let listener = match TcpListener::bind(&config.listen_address).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(address = %config.listen_address, error = %err, "fspipe listener failed to bind");
            return;
        },
    };
    info!(address = %config.listen_address, "fspipe listener ready");

    let queue_config = sidecar_fspipe::QueueConfig {
        capacity: config.queue_capacity,
        enqueue_block: Duration::from_secs(config.ack_timeout_s),
        ack_timeout: Duration::from_secs(config.ack_timeout_s),
        max_retries: config.max_retries,
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("fspipe listener shutting down");
                return;
            },
            accepted = listener.accept() => {
                let Ok((stream, peer)) = accepted else { continue };
                let (reader, writer) = session::split(stream);
                let registry = state.fspipe_registry.clone();
                let _session: std::sync::Arc<FsPipeSession<_>> =
                    FsPipeSession::spawn(reader, writer, queue_config, Some(registry));
                info!(%peer, "fspipe connection accepted");
            },
        }
    }
}
