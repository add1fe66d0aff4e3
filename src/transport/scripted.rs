//! In-memory transport that replays canned service frames.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Body, Frame, Message, Transport};
use crate::error::{Result, ServiceError};

/// Frames written by the client, shared with the test.
pub type Written = Arc<Mutex<Vec<Vec<u8>>>>;

/// Replays queued frames on `read_frame` and records every write.
///
/// Once the queue is empty, reads fail as if the pipe had closed.
pub struct ScriptedTransport {
    inbound: VecDeque<Vec<u8>>,
    written: Written,
    alive: bool,
}

impl ScriptedTransport {
    pub fn new() -> (Self, Written) {
        let written = Written::default();
        let transport = Self {
            inbound: VecDeque::new(),
            written: Arc::clone(&written),
            alive: true,
        };
        (transport, written)
    }

    /// Queue a reply message.
    pub fn reply(mut self, id: u32, body: Body) -> Self {
        let bytes = Message::new(id, body).encode().unwrap();
        self.inbound.push_back(bytes);
        self
    }

    /// Queue raw bytes, e.g. a corrupted frame.
    pub fn raw(mut self, bytes: Vec<u8>) -> Self {
        self.inbound.push_back(bytes);
        self
    }
}

/// Decode everything the client wrote.
pub fn decoded(written: &Written) -> Vec<Message> {
    written
        .lock()
        .unwrap()
        .iter()
        .map(|bytes| Message::try_from(&Frame::decode(bytes).unwrap()).unwrap())
        .collect()
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if !self.alive {
            return Err(ServiceError::ServiceUnavailable("closed".into()));
        }
        self.written.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        self.inbound
            .pop_front()
            .ok_or_else(|| ServiceError::ServiceUnavailable("script exhausted".into()))
    }

    async fn close(&mut self) {
        self.alive = false;
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }
}
