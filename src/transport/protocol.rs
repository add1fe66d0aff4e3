//! Editor service message types and body codec.
//!
//! Every frame on the wire has the shape:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────────┬────────────┐
//! │ id       │ kind     │ body len │ body         │ trailer    │
//! │ u32 BE   │ u32 BE   │ u32 BE   │ body len B   │ 0xFFFFFFFF │
//! └──────────┴──────────┴──────────┴──────────────┴────────────┘
//! ```
//!
//! Body fields are 4-byte big-endian integers and strings encoded as
//! `[utf8 byte length: u32 BE][utf8 bytes]`.

use crate::error::{Result, ServiceError};

/// Size of the fixed frame head (`id`, `kind`, `body len`).
pub const HEAD_SIZE: usize = 12;

/// Size of the frame trailer.
pub const TRAILER_SIZE: usize = 4;

/// Sentinel closing every frame. Never valid as a length.
pub const FRAME_TRAILER: u32 = 0xFFFF_FFFF;

/// Maximum body size accepted from the service (64 MB).
pub const MAX_BODY_SIZE: u32 = 64 * 1024 * 1024;

/// Message kind tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Success,
    Error,
    ShutdownService,
    Active,
    CanFormat,
    CanFormatResponse,
    Format,
    FormatResponse,
    CancelFormat,
}

impl MessageKind {
    /// Wire tag for this kind.
    pub const fn tag(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::ShutdownService => 2,
            Self::Active => 3,
            Self::CanFormat => 4,
            Self::CanFormatResponse => 5,
            Self::Format => 6,
            Self::FormatResponse => 7,
            Self::CancelFormat => 8,
        }
    }

    /// Map a wire tag back to a kind. `None` for unrecognised tags.
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Success),
            1 => Some(Self::Error),
            2 => Some(Self::ShutdownService),
            3 => Some(Self::Active),
            4 => Some(Self::CanFormat),
            5 => Some(Self::CanFormatResponse),
            6 => Some(Self::Format),
            7 => Some(Self::FormatResponse),
            8 => Some(Self::CancelFormat),
            _ => None,
        }
    }
}

/// A frame with its body still undecoded.
///
/// `kind` stays a raw tag here so that a frame with an unknown kind can
/// still be correlated and answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub kind: u32,
    pub body: Vec<u8>,
}

impl Frame {
    /// Encode into `[id][kind][body len][body][trailer]`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body_len = checked_len(self.body.len())?;

        let mut buf = Vec::with_capacity(HEAD_SIZE + self.body.len() + TRAILER_SIZE);
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.kind.to_be_bytes());
        buf.extend_from_slice(&body_len.to_be_bytes());
        buf.extend_from_slice(&self.body);
        buf.extend_from_slice(&FRAME_TRAILER.to_be_bytes());
        Ok(buf)
    }

    /// Decode one complete frame from `bytes`.
    ///
    /// Fails with `MalformedFrame` when the buffer is shorter than the head
    /// declares, or when the trailer is not the sentinel.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (id, kind, body_len) = decode_head(bytes)?;
        let body_end = HEAD_SIZE + body_len as usize;

        let body = bytes.get(HEAD_SIZE..body_end).ok_or_else(|| {
            ServiceError::MalformedFrame(format!(
                "stream ended before {body_len} body bytes were available"
            ))
        })?;
        let trailer = bytes.get(body_end..body_end + TRAILER_SIZE).ok_or_else(|| {
            ServiceError::MalformedFrame("stream ended before frame trailer".into())
        })?;
        check_trailer(trailer)?;

        Ok(Self {
            id,
            kind,
            body: body.to_vec(),
        })
    }
}

/// Parse the 12-byte head into `(id, kind, body len)`.
pub fn decode_head(bytes: &[u8]) -> Result<(u32, u32, u32)> {
    let head = bytes
        .get(..HEAD_SIZE)
        .ok_or_else(|| ServiceError::MalformedFrame("truncated frame head".into()))?;

    let mut reader = BodyReader::new(head);
    let id = reader.read_u32()?;
    let kind = reader.read_u32()?;
    let body_len = reader.read_u32()?;

    if body_len == FRAME_TRAILER || body_len > MAX_BODY_SIZE {
        return Err(ServiceError::MalformedFrame(format!(
            "body length {body_len} exceeds maximum of {MAX_BODY_SIZE}"
        )));
    }
    Ok((id, kind, body_len))
}

/// Verify a 4-byte trailer against the sentinel.
pub fn check_trailer(trailer: &[u8]) -> Result<()> {
    let value = BodyReader::new(trailer).read_u32()?;
    if value == FRAME_TRAILER {
        Ok(())
    } else {
        Err(ServiceError::MalformedFrame(format!(
            "trailer {value:#010x} does not match sentinel"
        )))
    }
}

/// Typed body of a message, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Acknowledges the message with `message_id`.
    Success { message_id: u32 },
    /// Reports a failure handling the message with `message_id`.
    Error { message_id: u32, message: String },
    ShutdownService,
    /// Liveness check or probe; either side may send it.
    Active,
    CanFormat { file_path: String },
    CanFormatResponse { message_id: u32, can_format: bool },
    Format {
        file_path: String,
        start_byte: u32,
        end_byte: u32,
        override_config: String,
        file_text: String,
    },
    /// `formatted` is `None` when the file needs no changes.
    FormatResponse {
        message_id: u32,
        formatted: Option<String>,
    },
    CancelFormat { message_id: u32 },
}

impl Body {
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Success { .. } => MessageKind::Success,
            Self::Error { .. } => MessageKind::Error,
            Self::ShutdownService => MessageKind::ShutdownService,
            Self::Active => MessageKind::Active,
            Self::CanFormat { .. } => MessageKind::CanFormat,
            Self::CanFormatResponse { .. } => MessageKind::CanFormatResponse,
            Self::Format { .. } => MessageKind::Format,
            Self::FormatResponse { .. } => MessageKind::FormatResponse,
            Self::CancelFormat { .. } => MessageKind::CancelFormat,
        }
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut w = BodyWriter::default();
        match self {
            Self::ShutdownService | Self::Active => {}
            Self::Success { message_id } | Self::CancelFormat { message_id } => {
                w.push_u32(*message_id);
            }
            Self::Error {
                message_id,
                message,
            } => {
                w.push_u32(*message_id);
                w.push_str(message)?;
            }
            Self::CanFormat { file_path } => w.push_str(file_path)?,
            Self::CanFormatResponse {
                message_id,
                can_format,
            } => {
                w.push_u32(*message_id);
                w.push_bool(*can_format);
            }
            Self::Format {
                file_path,
                start_byte,
                end_byte,
                override_config,
                file_text,
            } => {
                w.push_str(file_path)?;
                w.push_u32(*start_byte);
                w.push_u32(*end_byte);
                w.push_str(override_config)?;
                w.push_str(file_text)?;
            }
            Self::FormatResponse {
                message_id,
                formatted,
            } => {
                w.push_u32(*message_id);
                w.push_bool(formatted.is_some());
                if let Some(text) = formatted {
                    w.push_str(text)?;
                }
            }
        }
        Ok(w.into_inner())
    }

    fn decode(kind: MessageKind, body: &[u8]) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let decoded = match kind {
            MessageKind::Success => Self::Success {
                message_id: r.read_u32()?,
            },
            MessageKind::Error => Self::Error {
                message_id: r.read_u32()?,
                message: r.read_string()?,
            },
            MessageKind::ShutdownService => Self::ShutdownService,
            MessageKind::Active => Self::Active,
            MessageKind::CanFormat => Self::CanFormat {
                file_path: r.read_string()?,
            },
            MessageKind::CanFormatResponse => Self::CanFormatResponse {
                message_id: r.read_u32()?,
                can_format: r.read_bool()?,
            },
            MessageKind::Format => Self::Format {
                file_path: r.read_string()?,
                start_byte: r.read_u32()?,
                end_byte: r.read_u32()?,
                override_config: r.read_string()?,
                file_text: r.read_string()?,
            },
            MessageKind::FormatResponse => {
                let message_id = r.read_u32()?;
                let formatted = if r.read_bool()? {
                    Some(r.read_string()?)
                } else {
                    None
                };
                Self::FormatResponse {
                    message_id,
                    formatted,
                }
            }
            MessageKind::CancelFormat => Self::CancelFormat {
                message_id: r.read_u32()?,
            },
        };
        Ok(decoded)
    }
}

/// A decoded message: correlation id plus typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u32,
    pub body: Body,
}

impl Message {
    pub const fn new(id: u32, body: Body) -> Self {
        Self { id, body }
    }

    pub const fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn to_frame(&self) -> Result<Frame> {
        Ok(Frame {
            id: self.id,
            kind: self.kind().tag(),
            body: self.body.encode()?,
        })
    }

    /// Encode straight to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.to_frame()?.encode()
    }

    /// Decode the body of a frame whose kind is already known.
    pub fn from_frame(kind: MessageKind, frame: &Frame) -> Result<Self> {
        Ok(Self {
            id: frame.id,
            body: Body::decode(kind, &frame.body)?,
        })
    }
}

impl TryFrom<&Frame> for Message {
    type Error = ServiceError;

    fn try_from(frame: &Frame) -> Result<Self> {
        let kind = MessageKind::from_tag(frame.kind).ok_or_else(|| {
            ServiceError::Protocol(format!("Invalid message kind: {}", frame.kind))
        })?;
        Self::from_frame(kind, frame)
    }
}

/// Appends body fields in wire order.
#[derive(Debug, Default)]
pub struct BodyWriter {
    buf: Vec<u8>,
}

impl BodyWriter {
    pub fn push_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn push_bool(&mut self, value: bool) {
        self.push_u32(u32::from(value));
    }

    /// Push `[utf8 byte length][utf8 bytes]`.
    pub fn push_str(&mut self, value: &str) -> Result<()> {
        let len = checked_len(value.len())?;
        self.push_u32(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads body fields in wire order.
#[derive(Debug)]
pub struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        let Some(end) = end else {
            return Err(ServiceError::MalformedFrame(format!(
                "body ended at {} bytes, needed {} more",
                self.buf.len(),
                len
            )));
        };
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Only `1` reads as true.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u32()? == 1)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()?;
        if len == FRAME_TRAILER {
            return Err(ServiceError::MalformedFrame(
                "string length equals the frame sentinel".into(),
            ));
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ServiceError::MalformedFrame(format!("invalid UTF-8 in string: {e}")))
    }
}

/// Lengths must fit in a u32 and must not collide with the sentinel.
fn checked_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|len| *len != FRAME_TRAILER)
        .ok_or(ServiceError::MessageTooLarge(len))
}
