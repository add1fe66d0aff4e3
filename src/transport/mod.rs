//! Transport layer for client ↔ editor service communication.
//!
//! Provides the `Transport` trait and the frame read/write functions.
//! `StdioPipeTransport` owns the `dprint editor-service` child and talks
//! over its stdin/stdout pipes.

pub mod protocol;
pub mod stdio_pipe;

#[cfg(test)]
pub(crate) mod scripted;

pub use protocol::{Body, Frame, Message, MessageKind};
pub use stdio_pipe::StdioPipeTransport;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, ServiceError};
use protocol::{decode_head, HEAD_SIZE, TRAILER_SIZE};

/// Abstraction over the byte channel to the editor service.
///
/// Each call is a single blocking exchange step; callers never interleave
/// a write with a partially read frame.
#[async_trait]
pub trait Transport: Send {
    /// Write one complete frame and flush it.
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Read exactly one complete frame (head, body, trailer).
    async fn read_frame(&mut self) -> Result<Vec<u8>>;

    /// Release the underlying process. Idempotent.
    async fn close(&mut self);

    /// Check whether the underlying process is still alive.
    fn is_alive(&mut self) -> bool;
}

/// Write a frame to a writer and flush immediately.
pub async fn send_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame).await.map_err(pipe_error)?;
    writer.flush().await.map_err(pipe_error)?;
    Ok(())
}

/// Read one frame from a reader.
///
/// EOF before the first head byte means the service closed its pipe
/// (`ServiceUnavailable`); EOF anywhere later means the frame was cut off
/// (`MalformedFrame`). The trailer is left for `Frame::decode` to verify.
pub async fn recv_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut head = [0u8; HEAD_SIZE];
    let mut filled = 0;
    while filled < HEAD_SIZE {
        let n = reader.read(&mut head[filled..]).await.map_err(pipe_error)?;
        if n == 0 {
            return Err(if filled == 0 {
                ServiceError::ServiceUnavailable("service closed its output pipe".into())
            } else {
                ServiceError::MalformedFrame(format!(
                    "stream ended after {filled} of {HEAD_SIZE} head bytes"
                ))
            });
        }
        filled += n;
    }

    let (_, _, body_len) = decode_head(&head)?;

    let mut buf = Vec::with_capacity(HEAD_SIZE + body_len as usize + TRAILER_SIZE);
    buf.extend_from_slice(&head);
    buf.resize(HEAD_SIZE + body_len as usize + TRAILER_SIZE, 0);

    reader
        .read_exact(&mut buf[HEAD_SIZE..])
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ServiceError::MalformedFrame(format!(
                "stream ended before {body_len} body bytes and trailer were available"
            )),
            _ => ServiceError::Io(e),
        })?;
    Ok(buf)
}

fn pipe_error(e: std::io::Error) -> ServiceError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            ServiceError::ServiceUnavailable("service closed its output pipe".into())
        }
        std::io::ErrorKind::BrokenPipe => {
            ServiceError::ServiceUnavailable("service closed its input pipe".into())
        }
        _ => ServiceError::Io(e),
    }
}
