// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Ties the wire codec, outbound queue, and (for the receiving end) a
//! [`FileRegistry`] together over one duplex byte stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sidecar_core::SidecarError;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::warn;

use crate::queue::{OutboundQueue, QueueConfig};
use crate::registry::FileRegistry;
use crate::wire::{read_frame, write_frame, Message};

/// One end of an FsPipe connection: a queue for outbound traffic, and
/// (optionally) a registry applying inbound control/write messages.
pub struct FsPipeSession<W> {
    writer: Mutex<W>,
    queue: Arc<OutboundQueue>,
    registry: Option<Arc<FileRegistry>>,
    closed: Arc<AtomicBool>,
}

impl<W> FsPipeSession<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Spawns the writer-pump and reader-pump tasks and returns a handle.
    ///
    /// `registry` is `Some` on the end that applies inbound writes to real
    /// files (the server side); `None` on the end that only issues them.
    pub fn spawn<R>(reader: R, writer: W, config: QueueConfig, registry: Option<Arc<FileRegistry>>) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let queue = Arc::new(OutboundQueue::new(config));
        let session = Arc::new(Self { writer: Mutex::new(writer), queue, registry, closed: Arc::new(AtomicBool::new(false)) });

        tokio::spawn(run_writer_pump(Arc::clone(&session)));
        tokio::spawn(run_reader_pump(Arc::clone(&session), reader));

        session
    }

    #[must_use]
    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn dispatch_inbound(&self, message: Message) {
        if let Message::WriteAck(ack) = message {
            self.queue.handle_ack(ack).await;
            return;
        }

        let Some(registry) = &self.registry else {
            return;
        };

        match registry.apply(message).await {
            Ok(Some(reply)) => {
                let mut writer = self.writer.lock().await;
                if let Err(err) = write_frame(&mut *writer, &reply).await {
                    warn!(error = %err, "fspipe failed to write reply frame");
                }
            },
            Ok(None) => {},
            Err(err) => warn!(error = %err, "fspipe failed to apply inbound message"),
        }
    }
}

async fn run_writer_pump<W>(session: Arc<FsPipeSession<W>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let Some(mut receiver) = session.queue.take_receiver().await else {
        return;
    };
    while let Some(message) = receiver.recv().await {
        let mut writer = session.writer.lock().await;
        if write_frame(&mut *writer, &message).await.is_err() {
            break;
        }
    }
    session.closed.store(true, Ordering::SeqCst);
}

async fn run_reader_pump<W, R>(session: Arc<FsPipeSession<W>>, mut reader: R)
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(message)) => session.dispatch_inbound(message).await,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "fspipe read loop terminating");
                break;
            },
        }
    }
    session.closed.store(true, Ordering::SeqCst);
}

/// Splits a single duplex stream (e.g. a `TcpStream`) into owned read/write
/// halves suitable for [`FsPipeSession::spawn`].
pub fn split<S>(stream: S) -> (ReadHalf<S>, WriteHalf<S>)
where
    S: AsyncRead + AsyncWrite,
{
    tokio::io::split(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::wire::{FileCreate, WriteChunk};

    #[tokio::test]
    async fn write_chunk_round_trips_ack_back_to_client_queue() {
        let (client_stream, server_stream) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_stream);
        let (server_read, server_write) = tokio::io::split(server_stream);

        let client = FsPipeSession::spawn(client_read, client_write, QueueConfig::default(), None);

        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FileRegistry::new(dir.path().to_path_buf()));
        let _server = FsPipeSession::spawn(server_read, server_write, QueueConfig::default(), Some(registry));

        let file_id = crate::wire::FileId::from_counter(1);
        client
            .queue()
            .enqueue(Message::FileCreate(FileCreate { file_id, path: "a.bin".to_string() }))
            .await
            .unwrap();

        let ack = client
            .queue()
            .enqueue_sync(WriteChunk { file_id, offset: 0, data: Bytes::from_static(b"payload") })
            .await
            .unwrap();

        assert_eq!(ack.bytes_written, 7);
        assert!(ack.error.is_none());

        let contents = tokio::fs::read(dir.path().join("a.bin")).await.unwrap();
        assert_eq!(contents, b"payload");
    }
}
