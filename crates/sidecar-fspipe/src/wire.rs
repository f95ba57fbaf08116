// SPDX-FileCopyrightText: © 2025 Sidecar Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Frame format: `[type:u8][len:u32 big-endian][payload:len bytes]`. Control
//! message payloads are length-prefixed JSON; `WriteChunk` carries a raw
//! `[fileId:16][offset:u64][data]` payload instead.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use sidecar_core::SidecarError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are rejected before the payload is read.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// A 16-byte key identifying a file on both ends of the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub [u8; 16]);

impl FileId {
    /// Derives a file id from a process-local monotonic counter. Unique
    /// within one session; not meant to be globally unique.
    #[must_use]
    pub fn from_counter(value: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[8..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for FileId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FileId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.len() != 32 {
            return Err(serde::de::Error::custom("file id must be 32 hex characters"));
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let hex = &text[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(hex, 16).map_err(serde::de::Error::custom)?;
        }
        Ok(Self(bytes))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum MessageType {
    FileCreate = 1,
    FileClose = 2,
    WriteChunk = 3,
    WriteAck = 4,
    Truncate = 5,
    Rename = 6,
    Delete = 7,
}

impl MessageType {
    const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::FileCreate),
            2 => Some(Self::FileClose),
            3 => Some(Self::WriteChunk),
            4 => Some(Self::WriteAck),
            5 => Some(Self::Truncate),
            6 => Some(Self::Rename),
            7 => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FileCreate => "FileCreate",
            Self::FileClose => "FileClose",
            Self::WriteChunk => "WriteChunk",
            Self::WriteAck => "WriteAck",
            Self::Truncate => "Truncate",
            Self::Rename => "Rename",
            Self::Delete => "Delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCreate {
    pub file_id: FileId,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileClose {
    pub file_id: FileId,
}

#[derive(Debug, Clone)]
pub struct WriteChunk {
    pub file_id: FileId,
    pub offset: u64,
    pub data: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteAck {
    pub file_id: FileId,
    pub offset: u64,
    pub bytes_written: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Truncate {
    pub file_id: FileId,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rename {
    pub file_id: FileId,
    pub new_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delete {
    pub file_id: FileId,
}

/// One decoded frame, either direction.
#[derive(Debug, Clone)]
pub enum Message {
    FileCreate(FileCreate),
    FileClose(FileClose),
    WriteChunk(WriteChunk),
    WriteAck(WriteAck),
    Truncate(Truncate),
    Rename(Rename),
    Delete(Delete),
}

impl Message {
    const fn message_type(&self) -> MessageType {
        match self {
            Self::FileCreate(_) => MessageType::FileCreate,
            Self::FileClose(_) => MessageType::FileClose,
            Self::WriteChunk(_) => MessageType::WriteChunk,
            Self::WriteAck(_) => MessageType::WriteAck,
            Self::Truncate(_) => MessageType::Truncate,
            Self::Rename(_) => MessageType::Rename,
            Self::Delete(_) => MessageType::Delete,
        }
    }

    fn encode_payload(&self) -> Result<BytesMut, SidecarError> {
        if let Self::WriteChunk(chunk) = self {
            let mut buf = BytesMut::with_capacity(16 + 8 + chunk.data.len());
            buf.put_slice(&chunk.file_id.0);
            buf.put_u64(chunk.offset);
            buf.put_slice(&chunk.data);
            return Ok(buf);
        }

        let json = match self {
            Self::FileCreate(v) => serde_json::to_vec(v),
            Self::FileClose(v) => serde_json::to_vec(v),
            Self::WriteAck(v) => serde_json::to_vec(v),
            Self::Truncate(v) => serde_json::to_vec(v),
            Self::Rename(v) => serde_json::to_vec(v),
            Self::Delete(v) => serde_json::to_vec(v),
            Self::WriteChunk(_) => unreachable!("handled above"),
        }
        .map_err(|err| SidecarError::InvalidArgument(format!("bad fspipe payload: {err}")))?;
        let mut buf = BytesMut::with_capacity(json.len());
        buf.put_slice(&json);
        Ok(buf)
    }

    fn decode_payload(kind: MessageType, payload: &[u8]) -> Result<Self, SidecarError> {
        if kind == MessageType::WriteChunk {
            if payload.len() < 24 {
                return Err(SidecarError::InvalidArgument("truncated WriteChunk frame".to_string()));
            }
            let mut file_id = [0u8; 16];
            file_id.copy_from_slice(&payload[0..16]);
            let offset = u64::from_be_bytes(payload[16..24].try_into().expect("8-byte slice"));
            return Ok(Self::WriteChunk(WriteChunk {
                file_id: FileId(file_id),
                offset,
                data: Bytes::copy_from_slice(&payload[24..]),
            }));
        }

        let parse_err = |err: serde_json::Error| SidecarError::InvalidArgument(format!("bad fspipe payload: {err}"));
        Ok(match kind {
            MessageType::FileCreate => Self::FileCreate(serde_json::from_slice(payload).map_err(parse_err)?),
            MessageType::FileClose => Self::FileClose(serde_json::from_slice(payload).map_err(parse_err)?),
            MessageType::WriteAck => Self::WriteAck(serde_json::from_slice(payload).map_err(parse_err)?),
            MessageType::Truncate => Self::Truncate(serde_json::from_slice(payload).map_err(parse_err)?),
            MessageType::Rename => Self::Rename(serde_json::from_slice(payload).map_err(parse_err)?),
            MessageType::Delete => Self::Delete(serde_json::from_slice(payload).map_err(parse_err)?),
            MessageType::WriteChunk => unreachable!("handled above"),
        })
    }
}

/// Writes one frame: tag, big-endian length, payload.
///
/// # Errors
/// Returns [`SidecarError::Io`] on a write failure.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> Result<(), SidecarError> {
    let payload = message.encode_payload()?;
    writer.write_u8(message.message_type() as u8).await?;
    writer.write_u32(u32::try_from(payload.len()).unwrap_or(u32::MAX)).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame, or returns `Ok(None)` on a clean EOF before the first byte.
///
/// # Errors
/// Returns [`SidecarError::InvalidArgument`] on an unknown type tag or an
/// oversized length prefix, [`SidecarError::Io`] on a read failure.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Message>, SidecarError> {
    let tag = match reader.read_u8().await {
        Ok(tag) => tag,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let kind = MessageType::from_u8(tag)
        .ok_or_else(|| SidecarError::InvalidArgument(format!("unknown fspipe frame type {tag}")))?;

    let len = reader.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(SidecarError::InvalidArgument(format!("fspipe frame length {len} exceeds max")));
    }

    let mut payload = BytesMut::zeroed(len as usize);
    reader.read_exact(&mut payload).await?;
    Message::decode_payload(kind, &payload.freeze()).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_chunk_round_trips() {
        let original = Message::WriteChunk(WriteChunk {
            file_id: FileId::from_counter(7),
            offset: 1024,
            data: Bytes::from_static(b"hello"),
        });

        let mut buf = Vec::new();
        write_frame(&mut buf, &original).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_frame(&mut cursor).await.unwrap().unwrap();
        match decoded {
            Message::WriteChunk(chunk) => {
                assert_eq!(chunk.file_id, FileId::from_counter(7));
                assert_eq!(chunk.offset, 1024);
                assert_eq!(&chunk.data[..], b"hello");
            },
            other => panic!("expected WriteChunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_ack_round_trips_through_json() {
        let original = Message::WriteAck(WriteAck {
            file_id: FileId::from_counter(1),
            offset: 0,
            bytes_written: 5,
            error: None,
        });
        let mut buf = Vec::new();
        write_frame(&mut buf, &original).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_frame(&mut cursor).await.unwrap().unwrap();
        match decoded {
            Message::WriteAck(ack) => {
                assert_eq!(ack.offset, 0);
                assert_eq!(ack.bytes_written, 5);
            },
            other => panic!("expected WriteAck, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_eof_before_any_frame_is_not_an_error() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.push(MessageType::WriteChunk as u8);
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        assert!(matches!(read_frame(&mut cursor).await, Err(SidecarError::InvalidArgument(_))));
    }

    #[test]
    fn file_id_display_round_trips_through_json() {
        let id = FileId::from_counter(42);
        let json = serde_json::to_string(&id).unwrap();
        let parsed: FileId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
