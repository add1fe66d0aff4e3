//! Request/response engine for the editor service protocol.
//!
//! One request is outstanding at a time. After writing a request the engine
//! reads frames until the reply correlated to that request arrives. The
//! service may interleave its own `Active` probes; those are answered in
//! place and the wait continues.

use tracing::{debug, instrument, warn};

use crate::error::{Result, ServiceError};
use crate::transport::protocol::FRAME_TRAILER;
use crate::transport::{Body, Frame, Message, MessageKind, Transport};

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No service has been spawned.
    Uninitialized,
    Idle,
    /// A request has been written and its reply is not yet in.
    AwaitingReply,
    /// Terminal. Every call fails with `ServiceStopped`.
    Shutdown,
}

/// A reply correlated to the outstanding request.
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Success,
    CanFormat(bool),
    Format(Option<String>),
}

/// Drives the wire protocol over a `Transport`.
pub struct ProtocolEngine {
    transport: Box<dyn Transport>,
    state: EngineState,
    next_id: u32,
    is_active: bool,
}

impl ProtocolEngine {
    /// Wrap a connected transport. The engine starts `Idle`.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            state: EngineState::Idle,
            next_id: 1,
            is_active: false,
        }
    }

    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Result of the most recent liveness check.
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    /// Whether requests can still be issued.
    ///
    /// Notices a service that exited on its own and moves to `Shutdown`.
    pub fn is_alive(&mut self) -> bool {
        if self.state == EngineState::Shutdown {
            return false;
        }
        if !self.transport.is_alive() {
            debug!("Editor service process is gone");
            self.state = EngineState::Shutdown;
            return false;
        }
        true
    }

    /// Liveness round-trip: send `Active`, expect `Success`.
    pub async fn check_active(&mut self) -> Result<bool> {
        self.is_active = false;
        match self.request(Body::Active).await? {
            Reply::Success => {
                self.is_active = true;
                Ok(true)
            }
            other => Err(unexpected_reply(MessageKind::Active, &other)),
        }
    }

    /// Ask the service whether it has a plugin for `file_path`.
    #[instrument(skip(self))]
    pub async fn can_format(&mut self, file_path: &str) -> Result<bool> {
        let body = Body::CanFormat {
            file_path: file_path.to_string(),
        };
        match self.request(body).await? {
            Reply::CanFormat(can_format) => Ok(can_format),
            other => Err(unexpected_reply(MessageKind::CanFormat, &other)),
        }
    }

    /// Format `file_text` as the file at `file_path`.
    ///
    /// Returns `None` when the service reports the text is already
    /// formatted.
    #[instrument(skip(self, file_text), fields(text_len = file_text.len()))]
    pub async fn format(&mut self, file_path: &str, file_text: &str) -> Result<Option<String>> {
        let body = Body::Format {
            file_path: file_path.to_string(),
            start_byte: 0,
            end_byte: 0,
            override_config: String::new(),
            file_text: file_text.to_string(),
        };
        match self.request(body).await? {
            Reply::Format(formatted) => Ok(formatted),
            // Some service versions acknowledge an unchanged file with a
            // plain success.
            Reply::Success => Ok(None),
            other @ Reply::CanFormat(_) => Err(unexpected_reply(MessageKind::Format, &other)),
        }
    }

    /// Send `ShutdownService` and release the transport.
    ///
    /// The service may exit without replying; a closed pipe here counts
    /// as a clean shutdown.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == EngineState::Shutdown {
            return Ok(());
        }
        let result = match self.request(Body::ShutdownService).await {
            Ok(_) => Ok(()),
            Err(ServiceError::ServiceUnavailable(reason)) => {
                debug!(%reason, "Service closed pipe during shutdown");
                Ok(())
            }
            Err(e) => Err(e),
        };
        self.close().await;
        result
    }

    /// Move to `Shutdown` and release the transport without talking to it.
    pub async fn close(&mut self) {
        self.state = EngineState::Shutdown;
        self.is_active = false;
        self.transport.close().await;
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = match id.wrapping_add(1) {
            FRAME_TRAILER => 0,
            next => next,
        };
        id
    }

    /// Issue one request and wait for its correlated reply.
    ///
    /// Fatal errors close the transport; request-scoped errors return the
    /// engine to `Idle`.
    async fn request(&mut self, body: Body) -> Result<Reply> {
        match self.state {
            EngineState::Shutdown | EngineState::Uninitialized => {
                return Err(ServiceError::ServiceStopped)
            }
            EngineState::AwaitingReply => {
                let err = ServiceError::ServiceUnavailable(
                    "previous request was abandoned mid-exchange".into(),
                );
                warn!(error = %err, "Pipe desynchronised, stopping engine");
                self.close().await;
                return Err(err);
            }
            EngineState::Idle => {}
        }

        let message = Message::new(self.next_id(), body);
        let bytes = message.encode()?;

        self.state = EngineState::AwaitingReply;
        let result = self.exchange(&message, &bytes).await;

        match &result {
            Err(e) if e.is_fatal() => {
                warn!(error = %e, id = message.id, "Request failed, stopping engine");
                self.close().await;
            }
            _ => self.state = EngineState::Idle,
        }
        result
    }

    async fn exchange(&mut self, request: &Message, bytes: &[u8]) -> Result<Reply> {
        debug!(id = request.id, kind = ?request.kind(), "Sending request");
        self.transport.write_frame(bytes).await?;

        loop {
            let bytes = self.transport.read_frame().await?;
            let frame = Frame::decode(&bytes)?;
            debug!(id = frame.id, kind = frame.kind, len = frame.body.len(), "Received frame");

            if let Some(reply) = self.dispatch(request.id, frame).await? {
                return Ok(reply);
            }
        }
    }

    /// Handle one inbound frame. `Ok(None)` means keep waiting.
    async fn dispatch(&mut self, request_id: u32, frame: Frame) -> Result<Option<Reply>> {
        let Some(kind) = MessageKind::from_tag(frame.kind) else {
            return Err(self.reject(&frame).await);
        };

        let message = match kind {
            MessageKind::Active => {
                self.answer_probe(frame.id).await?;
                return Ok(None);
            }
            MessageKind::Success
            | MessageKind::Error
            | MessageKind::CanFormatResponse
            | MessageKind::FormatResponse => Message::from_frame(kind, &frame)?,
            MessageKind::ShutdownService
            | MessageKind::CanFormat
            | MessageKind::Format
            | MessageKind::CancelFormat => return Err(self.reject(&frame).await),
        };

        let reply = match message.body {
            Body::Success { message_id } if message_id == request_id => Reply::Success,
            Body::Error {
                message_id,
                message,
            } if message_id == request_id => return Err(ServiceError::RemoteError(message)),
            Body::CanFormatResponse {
                message_id,
                can_format,
            } if message_id == request_id => Reply::CanFormat(can_format),
            Body::FormatResponse {
                message_id,
                formatted,
            } if message_id == request_id => Reply::Format(formatted),
            other => {
                warn!(
                    expected = request_id,
                    kind = ?other.kind(),
                    "Skipping reply for a request that is no longer outstanding"
                );
                return Ok(None);
            }
        };
        Ok(Some(reply))
    }

    /// Answer a service-initiated `Active` probe.
    async fn answer_probe(&mut self, probe_id: u32) -> Result<()> {
        debug!(probe_id, "Answering liveness probe");
        let success = Message::new(
            self.next_id(),
            Body::Success {
                message_id: probe_id,
            },
        );
        self.transport.write_frame(&success.encode()?).await
    }

    /// Tell the service it sent a kind we never accept, then fail the call.
    async fn reject(&mut self, frame: &Frame) -> ServiceError {
        let reason = format!("Invalid message kind: {}", frame.kind);
        warn!(id = frame.id, kind = frame.kind, "Service sent a message the client does not accept");

        let error = Message::new(
            self.next_id(),
            Body::Error {
                message_id: frame.id,
                message: reason.clone(),
            },
        );
        let sent = match error.encode() {
            Ok(bytes) => self.transport.write_frame(&bytes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!(error = %e, "Failed to report invalid message to service");
        }

        ServiceError::Protocol(reason)
    }
}

fn unexpected_reply(request: MessageKind, reply: &Reply) -> ServiceError {
    ServiceError::Protocol(format!("unexpected reply {reply:?} to {request:?} request"))
}
