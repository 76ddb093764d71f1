//! Frame codec shared by the RPC transport and the inbound RPC listener.
//!
//! A frame is `u32 length (big-endian) | u8 kind | JSON body`, where
//! `length` counts the kind byte plus the body. Requests carry
//! [`FrameKind::Predict`] or [`FrameKind::Feedback`]; replies carry
//! [`FrameKind::Ok`] with the result payload or [`FrameKind::Err`] with an
//! error body. Frames larger than [`MAX_FRAME_LEN`] are rejected before
//! allocation.

use bytes::{BufMut, BytesMut};
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame body; tensors beyond this belong in
/// object storage, not an RPC payload.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Discriminator byte of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Predict = 0,
    Feedback = 1,
    Ok = 2,
    Err = 3,
}

impl FrameKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Predict),
            1 => Some(Self::Feedback),
            2 => Some(Self::Ok),
            3 => Some(Self::Err),
            _ => None,
        }
    }
}

/// One length-prefixed message on an RPC channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub body: Value,
}

impl Frame {
    #[must_use]
    pub fn new(kind: FrameKind, body: Value) -> Self {
        Self { kind, body }
    }
}

/// Codec-level failures; `Io` covers the socket, the rest the framing.
#[derive(Debug, Error, Diagnostic)]
pub enum WireError {
    #[error(transparent)]
    #[diagnostic(code(trellis::wire::io))]
    Io(#[from] std::io::Error),

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    #[diagnostic(code(trellis::wire::too_large))]
    TooLarge(usize),

    #[error("unknown frame kind byte {0:#x}")]
    #[diagnostic(code(trellis::wire::bad_kind))]
    BadKind(u8),

    #[error("frame body is not valid JSON: {0}")]
    #[diagnostic(code(trellis::wire::bad_body))]
    BadBody(#[from] serde_json::Error),

    #[error("empty frame")]
    #[diagnostic(code(trellis::wire::empty))]
    Empty,
}

/// Encode a frame into a fresh buffer.
pub fn encode(frame: &Frame) -> Result<BytesMut, WireError> {
    let body = serde_json::to_vec(&frame.body)?;
    let len = body.len() + 1;
    if len > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(len));
    }
    let mut buf = BytesMut::with_capacity(4 + len);
    buf.put_u32(len as u32);
    buf.put_u8(frame.kind as u8);
    buf.put_slice(&body);
    Ok(buf)
}

/// Write one frame to the stream.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let buf = encode(frame)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame from the stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, WireError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len == 0 {
        return Err(WireError::Empty);
    }
    if len > MAX_FRAME_LEN {
        return Err(WireError::TooLarge(len));
    }
    let kind_byte = reader.read_u8().await?;
    let kind = FrameKind::from_byte(kind_byte).ok_or(WireError::BadKind(kind_byte))?;
    let mut body = vec![0u8; len - 1];
    reader.read_exact(&mut body).await?;
    let body = serde_json::from_slice(&body)?;
    Ok(Frame { kind, body })
}
