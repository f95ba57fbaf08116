// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Composition root: owns one instance of each subsystem and the hubs the
//! SSE endpoints are backed by.

use std::sync::Arc;

use sidecar_core::{ShutdownCoordinator, SubscriptionHub};
use sidecar_domsync::DomSyncManager;
use sidecar_fspipe::FileRegistry;
use sidecar_media::VirtualMediaController;
use sidecar_recorder::RecorderRegistry;

use sidecar_api::sse::{ClipboardChange, FsWatchEvent};

use crate::config::Config;
use crate::metrics::SidecarMetrics;

/// Shared, cloneable application state passed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub shutdown: ShutdownCoordinator,
    pub recorders: RecorderRegistry,
    pub virtual_media: Arc<VirtualMediaController>,
    pub dom_sync: Arc<DomSyncManager>,
    pub fspipe_registry: Arc<FileRegistry>,
    /// Clipboard and filesystem-watch events have no producing subsystem in
    /// this crate's scope (the watcher that would publish into them lives
    /// outside the sidecar's core, per the external-interfaces contract);
    /// the hubs exist so the SSE routes and their backpressure semantics are
    /// real even before a producer is wired up.
    pub clipboard_hub: SubscriptionHub<ClipboardChange>,
    pub fs_watch_hub: SubscriptionHub<FsWatchEvent>,
    pub metrics: SidecarMetrics,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let shutdown = ShutdownCoordinator::new();
        let dom_sync = DomSyncManager::spawn(config.domsync.debugger_url.clone(), shutdown.token());
        let fspipe_registry = Arc::new(FileRegistry::new(config.fspipe.root_dir.clone()));

        Self {
            config: Arc::new(config),
            shutdown,
            recorders: RecorderRegistry::new(),
            virtual_media: Arc::new(VirtualMediaController::new()),
            dom_sync,
            fspipe_registry,
            clipboard_hub: SubscriptionHub::new(),
            fs_watch_hub: SubscriptionHub::new(),
            metrics: SidecarMetrics::shared(),
        }
    }
}
