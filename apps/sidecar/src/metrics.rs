// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! In-process metrics via the `opentelemetry` meter API. No OTLP exporter is
//! wired up: these are observed only through the `/metrics` SSE feed, not
//! exported off-box.

use std::sync::OnceLock;

use opentelemetry::metrics::{Counter, Gauge};
use opentelemetry::{global, KeyValue};

#[derive(Clone)]
pub struct SidecarMetrics {
    pub active_recordings: Gauge<u64>,
    pub dom_broadcasts: Counter<u64>,
    pub subscriber_count: Gauge<u64>,
}

impl SidecarMetrics {
    pub fn shared() -> Self {
        static METRICS: OnceLock<SidecarMetrics> = OnceLock::new();
        METRICS
            .get_or_init(|| {
                let meter = global::meter("sidecar");
                Self {
                    active_recordings: meter
                        .u64_gauge("sidecar.recordings.active")
                        .with_description("Number of recording sessions currently active")
                        .build(),
                    dom_broadcasts: meter
                        .u64_counter("sidecar.domsync.broadcasts")
                        .with_description("Total DOM snapshots broadcast")
                        .build(),
                    subscriber_count: meter
                        .u64_gauge("sidecar.hub.subscribers")
                        .with_description("Current subscriber count across all SSE/websocket hubs")
                        .build(),
                }
            })
            .clone()
    }

    pub fn record_active_recordings(&self, count: u64) {
        self.active_recordings.record(count, &[]);
    }

    pub fn record_dom_broadcast(&self) {
        self.dom_broadcasts.add(1, &[]);
    }

    pub fn record_subscriber_count(&self, hub: &'static str, count: u64) {
        self.subscriber_count.record(count, &[KeyValue::new("hub", hub)]);
    }
}
