// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Outbound backpressure and ack tracking.
//!
//! Ack correlation is scoped to `WriteChunk`/`WriteAck` pairs, keyed by
//! `(file_id, offset)` since that is the only pair the wire format actually
//! correlates (there is no generic per-message id on the wire). Other
//! message types are fire-and-forget once past the bounded queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sidecar_core::SidecarError;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::wire::{FileId, Message, WriteAck, WriteChunk};

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Bounded outbound queue depth.
    pub capacity: usize,
    /// How long `enqueue`/`enqueue_sync` block when the queue is full.
    pub enqueue_block: Duration,
    /// How long `enqueue_sync` waits for a matching `WriteAck`.
    pub ack_timeout: Duration,
    /// Retries before a pending write is permanently failed.
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            enqueue_block: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

struct PendingWrite {
    message: Message,
    retries: u32,
    ack_tx: Option<oneshot::Sender<Result<WriteAck, SidecarError>>>,
}

/// Outcome of one [`OutboundQueue::retry_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryOutcome {
    pub requeued: usize,
    pub failed: usize,
}

/// Bounded outbound message queue with ack tracking for `WriteChunk`s.
pub struct OutboundQueue {
    config: QueueConfig,
    sender: mpsc::Sender<Message>,
    receiver: Mutex<Option<mpsc::Receiver<Message>>>,
    pending: Mutex<HashMap<(FileId, u64), PendingWrite>>,
    next_id: AtomicU64,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        Self {
            config,
            sender,
            receiver: Mutex::new(Some(receiver)),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Takes the receiving half, once, for the writer task to drain.
    pub async fn take_receiver(&self) -> Option<mpsc::Receiver<Message>> {
        self.receiver.lock().await.take()
    }

    /// A process-local monotonic id, useful for generating fresh [`FileId`]s.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Enqueues `message`, blocking up to `enqueue_block` while the queue is
    /// full.
    ///
    /// # Errors
    /// Returns [`SidecarError::Transient`] if the queue is full past the
    /// block window or the session has closed.
    pub async fn enqueue(&self, message: Message) -> Result<(), SidecarError> {
        let key = self.track_pending(&message).await;
        if let Err(err) = self.send_blocking(message).await {
            if let Some(key) = key {
                self.pending.lock().await.remove(&key);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Enqueues a `WriteChunk` and waits up to `ack_timeout` for its
    /// matching `WriteAck`.
    ///
    /// # Errors
    /// Returns [`SidecarError::Transient`] on queue-full, session closed, or
    /// ack timeout.
    pub async fn enqueue_sync(&self, chunk: WriteChunk) -> Result<WriteAck, SidecarError> {
        let key = (chunk.file_id, chunk.offset);
        let (tx, rx) = oneshot::channel();
        let message = Message::WriteChunk(chunk);
        self.pending.lock().await.insert(key, PendingWrite { message: message.clone(), retries: 0, ack_tx: Some(tx) });

        if let Err(err) = self.send_blocking(message).await {
            self.pending.lock().await.remove(&key);
            return Err(err);
        }

        match tokio::time::timeout(self.config.ack_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SidecarError::Transient("fspipe session closed before ack".to_string())),
            Err(_) => {
                self.pending.lock().await.remove(&key);
                Err(SidecarError::Transient(format!(
                    "fspipe ack timed out after {}s",
                    self.config.ack_timeout.as_secs()
                )))
            },
        }
    }

    async fn track_pending(&self, message: &Message) -> Option<(FileId, u64)> {
        let Message::WriteChunk(chunk) = message else {
            return None;
        };
        let key = (chunk.file_id, chunk.offset);
        self.pending.lock().await.insert(key, PendingWrite { message: message.clone(), retries: 0, ack_tx: None });
        Some(key)
    }

    async fn send_blocking(&self, message: Message) -> Result<(), SidecarError> {
        match tokio::time::timeout(self.config.enqueue_block, self.sender.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SidecarError::Transient("fspipe session closed".to_string())),
            Err(_) => Err(SidecarError::Transient("fspipe outbound queue full".to_string())),
        }
    }

    /// Resolves a pending write by the incoming ack's `(file_id, offset)` key.
    pub async fn handle_ack(&self, ack: WriteAck) {
        let key = (ack.file_id, ack.offset);
        if let Some(entry) = self.pending.lock().await.remove(&key) {
            if let Some(tx) = entry.ack_tx {
                let _ = tx.send(Ok(ack));
            }
        }
    }

    /// Re-queues every still-pending write, failing any that have already
    /// exceeded `max_retries`.
    pub async fn retry_pending(&self) -> RetryOutcome {
        let mut outcome = RetryOutcome::default();
        let mut resend = Vec::new();

        {
            let mut pending = self.pending.lock().await;
            let keys: Vec<(FileId, u64)> = pending.keys().copied().collect();
            for key in keys {
                let exceeded = {
                    let entry = pending.get_mut(&key).expect("key just read from this map");
                    entry.retries += 1;
                    entry.retries > self.config.max_retries
                };
                if exceeded {
                    let entry = pending.remove(&key).expect("key just read from this map");
                    if let Some(tx) = entry.ack_tx {
                        let _ = tx.send(Err(SidecarError::Transient(format!(
                            "fspipe write at offset {} exceeded max retries",
                            key.1
                        ))));
                    }
                    outcome.failed += 1;
                } else {
                    resend.push(pending.get(&key).expect("key just read from this map").message.clone());
                }
            }
        }

        for message in resend {
            if self.sender.send(message).await.is_ok() {
                outcome.requeued += 1;
            }
        }
        outcome
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn chunk(offset: u64) -> WriteChunk {
        WriteChunk { file_id: FileId::from_counter(1), offset, data: Bytes::from_static(b"hi") }
    }

    #[tokio::test]
    async fn ack_resolves_matching_enqueue_sync() {
        let queue = OutboundQueue::new(QueueConfig::default());
        let mut receiver = queue.take_receiver().await.unwrap();

        let queue_ref = &queue;
        let (result, _) = tokio::join!(queue_ref.enqueue_sync(chunk(0)), async {
            let sent = receiver.recv().await.unwrap();
            let Message::WriteChunk(c) = sent else { panic!("expected WriteChunk") };
            queue_ref
                .handle_ack(WriteAck { file_id: c.file_id, offset: c.offset, bytes_written: 2, error: None })
                .await;
        });

        let ack = result.unwrap();
        assert_eq!(ack.bytes_written, 2);
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test]
    async fn retry_pending_requeues_until_max_retries_then_fails() {
        let config = QueueConfig { max_retries: 1, ..QueueConfig::default() };
        let queue = OutboundQueue::new(config);
        let mut receiver = queue.take_receiver().await.unwrap();

        queue.enqueue(Message::WriteChunk(chunk(0))).await.unwrap();
        receiver.recv().await.unwrap();

        let first = queue.retry_pending().await;
        assert_eq!(first, RetryOutcome { requeued: 1, failed: 0 });
        receiver.recv().await.unwrap();

        let second = queue.retry_pending().await;
        assert_eq!(second, RetryOutcome { requeued: 0, failed: 1 });
        assert_eq!(queue.pending_count().await, 0);
    }

    #[tokio::test]
    async fn enqueue_sync_times_out_without_a_matching_ack() {
        let config = QueueConfig { ack_timeout: Duration::from_millis(20), ..QueueConfig::default() };
        let queue = OutboundQueue::new(config);
        let _receiver = queue.take_receiver().await.unwrap();

        let err = queue.enqueue_sync(chunk(0)).await.unwrap_err();
        assert!(matches!(err, SidecarError::Transient(_)));
        assert_eq!(queue.pending_count().await, 0);
    }
}
