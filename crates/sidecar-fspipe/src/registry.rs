// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Server-side handler: applies inbound control/write messages against real
//! files rooted under a configured directory.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sidecar_core::SidecarError;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

use crate::wire::{FileId, Message, WriteAck};

struct OpenFile {
    path: PathBuf,
    // Concurrent writes to the same file id are serialized here so a
    // seek-then-write pair can't be interleaved with another writer's.
    handle: Mutex<File>,
}

/// Applies `FsPipeMessage`s to files under `root`, replying with `WriteAck`
/// for `WriteChunk`s and `None` for every other message type.
pub struct FileRegistry {
    root: PathBuf,
    files: Mutex<HashMap<FileId, Arc<OpenFile>>>,
}

impl FileRegistry {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root, files: Mutex::new(HashMap::new()) }
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, SidecarError> {
        let candidate = self.root.join(relative);
        if Path::new(relative).is_absolute() || relative.split('/').any(|part| part == "..") {
            return Err(SidecarError::InvalidArgument(format!("unsafe fspipe path: {relative}")));
        }
        Ok(candidate)
    }

    /// Applies one inbound message, returning a reply frame if one is due.
    ///
    /// # Errors
    /// Returns `SidecarError` for unknown file ids, unsafe paths, or I/O
    /// failures applying the operation — callers still get a `WriteAck` with
    /// `error` set for `WriteChunk` failures rather than a propagated error.
    pub async fn apply(&self, message: Message) -> Result<Option<Message>, SidecarError> {
        match message {
            Message::FileCreate(create) => {
                let path = self.resolve(&create.path)?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let file = tokio::fs::OpenOptions::new().create(true).write(true).truncate(false).open(&path).await?;
                self.files
                    .lock()
                    .await
                    .insert(create.file_id, Arc::new(OpenFile { path, handle: Mutex::new(file) }));
                Ok(None)
            },
            Message::FileClose(close) => {
                self.files.lock().await.remove(&close.file_id);
                Ok(None)
            },
            Message::WriteChunk(chunk) => {
                let file = self.files.lock().await.get(&chunk.file_id).cloned();
                let Some(file) = file else {
                    return Ok(Some(Message::WriteAck(WriteAck {
                        file_id: chunk.file_id,
                        offset: chunk.offset,
                        bytes_written: 0,
                        error: Some("unknown file id".to_string()),
                    })));
                };

                let mut handle = file.handle.lock().await;
                let ack = match write_positional(&mut handle, chunk.offset, &chunk.data).await {
                    Ok(written) => {
                        WriteAck { file_id: chunk.file_id, offset: chunk.offset, bytes_written: written, error: None }
                    },
                    Err(err) => {
                        warn!(path = %file.path.display(), error = %err, "fspipe write failed");
                        WriteAck { file_id: chunk.file_id, offset: chunk.offset, bytes_written: 0, error: Some(err.to_string()) }
                    },
                };
                Ok(Some(Message::WriteAck(ack)))
            },
            Message::Truncate(truncate) => {
                let file = self.files.lock().await.get(&truncate.file_id).cloned();
                if let Some(file) = file {
                    file.handle.lock().await.set_len(truncate.size).await?;
                }
                Ok(None)
            },
            Message::Rename(rename) => {
                let mut files = self.files.lock().await;
                if let Some(file) = files.get(&rename.file_id).cloned() {
                    let new_path = self.resolve(&rename.new_path)?;
                    tokio::fs::rename(&file.path, &new_path).await?;
                    let cloned_handle = file.handle.lock().await.try_clone().await?;
                    files.insert(rename.file_id, Arc::new(OpenFile { path: new_path, handle: Mutex::new(cloned_handle) }));
                }
                Ok(None)
            },
            Message::Delete(delete) => {
                let removed = self.files.lock().await.remove(&delete.file_id);
                if let Some(file) = removed {
                    tokio::fs::remove_file(&file.path).await.or_else(|err| {
                        if err.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(err) }
                    })?;
                }
                Ok(None)
            },
            Message::WriteAck(_) => Ok(None),
        }
    }
}

async fn write_positional(file: &mut File, offset: u64, data: &[u8]) -> Result<u64, SidecarError> {
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(u64::try_from(data.len()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::wire::{FileCreate, WriteChunk};

    #[tokio::test]
    async fn write_chunk_at_offset_acks_bytes_written() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        let file_id = FileId::from_counter(1);

        registry
            .apply(Message::FileCreate(FileCreate { file_id, path: "out.bin".to_string() }))
            .await
            .unwrap();

        let reply = registry
            .apply(Message::WriteChunk(WriteChunk { file_id, offset: 0, data: Bytes::from_static(b"hello") }))
            .await
            .unwrap();

        match reply {
            Some(Message::WriteAck(ack)) => {
                assert_eq!(ack.bytes_written, 5);
                assert!(ack.error.is_none());
            },
            other => panic!("expected WriteAck, got {other:?}"),
        }

        let contents = tokio::fs::read(dir.path().join("out.bin")).await.unwrap();
        assert_eq!(contents, b"hello");
    }

    #[tokio::test]
    async fn write_chunk_to_unknown_file_id_acks_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());

        let reply = registry
            .apply(Message::WriteChunk(WriteChunk {
                file_id: FileId::from_counter(99),
                offset: 0,
                data: Bytes::from_static(b"x"),
            }))
            .await
            .unwrap();

        match reply {
            Some(Message::WriteAck(ack)) => assert!(ack.error.is_some()),
            other => panic!("expected WriteAck, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::new(dir.path().to_path_buf());
        let err = registry
            .apply(Message::FileCreate(FileCreate { file_id: FileId::from_counter(1), path: "../escape.bin".to_string() }))
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::InvalidArgument(_)));
    }
}
