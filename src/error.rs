//! Error types for the editor service client.

use thiserror::Error;

/// Main error type for all editor service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Trailer sentinel mismatch, truncated frame, or an undecodable body.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Pipe closed or read timed out.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The engine is shut down; `start()` must be called again.
    #[error("Service stopped")]
    ServiceStopped,

    /// `editor-info` reported a schema version this client does not speak.
    #[error("{}", schema_mismatch_message(*expected, *actual))]
    SchemaMismatch { expected: u32, actual: u32 },

    /// The service reported an error for a specific request.
    #[error("Remote error: {0}")]
    RemoteError(String),

    /// Unexpected reply kind or an otherwise invalid exchange.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A string or body does not fit in a 32-bit length field.
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// The dprint executable could not be launched.
    #[error("Failed to spawn {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    /// `editor-info` failed or produced no usable output.
    #[error("Capability query failed: {0}")]
    CapabilityQuery(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error during pipe operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while reading configuration or editor info.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    /// Whether this error leaves the pipe in an unknown state.
    ///
    /// Fatal errors tear the engine down; the service must be restarted
    /// before further use. Remote and protocol errors only fail the
    /// request that produced them.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame(_) | Self::ServiceUnavailable(_) | Self::ServiceStopped | Self::Io(_)
        )
    }
}

fn schema_mismatch_message(expected: u32, actual: u32) -> String {
    if actual > expected {
        format!(
            "Please upgrade your editor extension to be compatible with the installed version of dprint \
             (schema {actual}, expected {expected})."
        )
    } else {
        format!(
            "Your installed version of dprint is out of date. Please update it \
             (schema {actual}, expected {expected})."
        )
    }
}

/// Result type alias using `ServiceError`.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_mismatch_distinguishes_direction() {
        let too_new = ServiceError::SchemaMismatch { expected: 4, actual: 5 }.to_string();
        let too_old = ServiceError::SchemaMismatch { expected: 4, actual: 3 }.to_string();

        assert!(too_new.contains("upgrade your editor extension"));
        assert!(too_old.contains("out of date"));
        assert_ne!(too_new, too_old);
    }

    #[test]
    fn fatal_classification() {
        assert!(ServiceError::MalformedFrame("x".into()).is_fatal());
        assert!(ServiceError::ServiceUnavailable("x".into()).is_fatal());
        assert!(ServiceError::ServiceStopped.is_fatal());
        assert!(!ServiceError::RemoteError("x".into()).is_fatal());
        assert!(!ServiceError::Protocol("x".into()).is_fatal());
    }
}
