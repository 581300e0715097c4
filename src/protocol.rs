//! Coordinator/worker protocol
//!
//! This module defines the messages exchanged between the coordinator and
//! worker nodes. Messages are serialized with MessagePack (rmp-serde) for
//! compact binary framing with full serde feature support.
//!
//! # Message Flow
//!
//! ```text
//! Worker                          Coordinator
//!   |-------- REGISTER ------------->|
//!   |-------- REQUEST_WORK --------->|
//!   |<------- WORK ------------------|
//!   |         ... local search ...   |
//!   |-------- FOUND ---------------->|   (on a match)
//!   |<------- STOP ------------------|   (broadcast once found)
//!   |<------- NO_WORK ---------------|   (keyspace exhausted)
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment this when making breaking changes to the protocol.
/// Coordinator and workers must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Sanity cap on frame size; every message here is a few dozen bytes
const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Protocol-level failure
///
/// `Malformed` means the frame boundary was intact but the payload did not
/// decode; the connection stays usable and the caller should keep reading.
/// Everything else means the stream can no longer be trusted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Malformed(#[from] rmp_serde::decode::Error),

    #[error("message encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES}-byte limit")]
    Oversize(usize),
}

impl ProtocolError {
    /// Whether the connection can keep being read after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::Malformed(_))
    }
}

/// Protocol message
///
/// All messages exchanged between the coordinator and worker nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Registration (Worker → Coordinator)
    ///
    /// Declares the worker's local parallel unit count. Sent once per
    /// connection, before the first work request.
    Register(RegisterMessage),

    /// Work poll (Worker → Coordinator)
    ///
    /// Asks for the next block of the keyspace.
    RequestWork(RequestWorkMessage),

    /// Assignment (Coordinator → Worker)
    ///
    /// A block of candidates plus the target digest to test against.
    Work(WorkMessage),

    /// Match report (Worker → Coordinator)
    Found(FoundMessage),

    /// Terminal stop (Coordinator → Worker): cease all searching
    Stop,

    /// Keyspace exhausted with no match yet (Coordinator → Worker)
    NoWork,
}

/// Registration message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Number of local parallel execution units
    pub parallelism: u32,
}

/// Work poll message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestWorkMessage {
    /// Number of local parallel execution units
    ///
    /// Lets the coordinator size the block even when this connection never
    /// sent an explicit registration.
    pub parallelism: u32,
}

/// Assignment message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkMessage {
    /// First candidate of the assigned block (inclusive)
    pub start: u64,

    /// Last candidate of the assigned block (inclusive)
    pub end: u64,

    /// Target digest, hex-encoded
    pub target_hash: String,
}

/// Match report message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundMessage {
    /// The matching candidate
    pub candidate: u64,
}

/// Serialize a message to bytes with the 4-byte length prefix
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let msg_bytes = rmp_serde::to_vec(msg)?;

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Deserialize a message from bytes
///
/// Expects a 4-byte length prefix followed by the MessagePack body.
/// Returns (message, bytes_consumed) where bytes_consumed includes the
/// length prefix.
pub fn deserialize_message(buf: &[u8]) -> Result<(Message, usize), ProtocolError> {
    if buf.len() < 4 {
        return Err(ProtocolError::Transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("buffer too small for message length (need 4 bytes, got {})", buf.len()),
        )));
    }

    let msg_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if msg_len > MAX_FRAME_BYTES {
        return Err(ProtocolError::Oversize(msg_len));
    }
    if buf.len() < 4 + msg_len {
        return Err(ProtocolError::Transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("incomplete message (need {} bytes, got {})", 4 + msg_len, buf.len()),
        )));
    }

    let msg = rmp_serde::from_slice(&buf[4..4 + msg_len])?;
    Ok((msg, 4 + msg_len))
}

/// Read a complete message from a stream
///
/// Reads the length prefix, then the complete body. Works on a whole
/// `TcpStream` or on a read half.
pub async fn read_message<R>(stream: &mut R) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_FRAME_BYTES {
        return Err(ProtocolError::Oversize(msg_len));
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream.read_exact(&mut msg_buf).await?;

    Ok(rmp_serde::from_slice(&msg_buf)?)
}

/// Write a message to a stream
///
/// Serializes with the length prefix and flushes so the frame is sent
/// immediately.
pub async fn write_message<W>(stream: &mut W, msg: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;
    stream.write_all(&framed).await?;
    stream.flush().await?;
    Ok(())
}
