//! dprint editor service client library
//!
//! This crate talks to a long-running `dprint editor-service` process over
//! its stdin/stdout pipes:
//! - Binary frame codec and message types (`transport::protocol`)
//! - Pipe transport owning the service process (`transport`)
//! - Request/response engine with liveness probe handling (`engine`)
//! - Service lifecycle and the editor-facing API (`service`)
//! - Plugin discovery via `dprint editor-info` (`capabilities`)

pub mod capabilities;
pub mod config;
pub mod engine;
pub mod error;
pub mod service;
pub mod transport;

pub use error::{Result, ServiceError};
pub use service::EditorService;
