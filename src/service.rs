//! Lifecycle management for the dprint editor service.
//!
//! `EditorService` is the single owner of one service process for an editor
//! session. It is created at startup, handed to whatever drives formatting,
//! and shut down on exit. A service that crashed or desynchronised stays
//! stopped until `start()` is called again.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::capabilities::{self, EditorInfo};
use crate::config::ServiceConfig;
use crate::engine::{EngineState, ProtocolEngine};
use crate::error::{Result, ServiceError};
use crate::transport::{StdioPipeTransport, Transport};

/// Owns the editor service process and the engine talking to it.
pub struct EditorService {
    config: ServiceConfig,
    engine: Option<ProtocolEngine>,
}

impl EditorService {
    /// Create an unstarted service.
    pub const fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            engine: None,
        }
    }

    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.engine
            .as_ref()
            .map_or(EngineState::Uninitialized, ProtocolEngine::state)
    }

    /// Spawn `dprint editor-service`. A running service is shut down first.
    pub async fn start(&mut self) -> Result<()> {
        if self.engine.is_some() {
            debug!("Restarting editor service");
            self.shutdown().await;
        }

        let transport = StdioPipeTransport::spawn(&self.config.executable, self.config.read_timeout())?;
        info!(pid = ?transport.pid(), exec = %self.config.executable, "Started editor service");
        self.attach(Box::new(transport));
        Ok(())
    }

    /// Use an already connected transport instead of spawning one.
    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        self.engine = Some(ProtocolEngine::new(transport));
    }

    /// Liveness round-trip with the service.
    ///
    /// Never fails: an absent, exited or unresponsive service is simply
    /// not running.
    pub async fn is_running(&mut self) -> bool {
        let Ok(engine) = self.engine() else {
            return false;
        };
        match engine.check_active().await {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "Editor service liveness check failed");
                false
            }
        }
    }

    /// Installed plugins for the project containing `dir`.
    pub async fn query_capabilities(&self, dir: &Path) -> Result<EditorInfo> {
        capabilities::query(&self.config, dir).await
    }

    /// Ask the service whether it can format `path`.
    pub async fn can_format(&mut self, path: &Path) -> Result<bool> {
        let file_path = path.to_string_lossy();
        self.engine()?.can_format(&file_path).await
    }

    /// `can_format`, narrowed to files some plugin in `info` claims.
    ///
    /// Contacts the service once; the extension check is local.
    pub async fn should_format(&mut self, path: &Path, info: &EditorInfo) -> Result<bool> {
        if !self.can_format(path).await? {
            return Ok(false);
        }
        let supported = info.supports(path);
        if !supported {
            debug!(path = %path.display(), "No installed plugin claims this file");
        }
        Ok(supported)
    }

    /// Format `text` as the contents of `path`.
    ///
    /// Returns `text` unchanged when the service reports nothing to do.
    /// `encoding` is the editor's name for the buffer encoding; the text
    /// itself always travels as UTF-8.
    #[instrument(skip(self, path, text), fields(path = %path.display()))]
    pub async fn format(&mut self, path: &Path, text: &str, encoding: &str) -> Result<String> {
        let file_path = path.to_string_lossy();
        match self.engine()?.format(&file_path, text).await? {
            Some(formatted) => Ok(formatted),
            None => Ok(text.to_string()),
        }
    }

    /// Ask the service to exit and release the process.
    ///
    /// Best-effort: failures are logged, never raised.
    pub async fn shutdown(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if engine.state() == EngineState::Shutdown {
            engine.close().await;
            return;
        }

        match tokio::time::timeout(self.config.shutdown_timeout(), engine.shutdown()).await {
            Ok(Ok(())) => info!("Editor service shut down"),
            Ok(Err(e)) => warn!(error = %e, "Editor service shutdown request failed"),
            Err(_) => warn!(
                timeout = ?self.config.shutdown_timeout(),
                "Editor service did not shut down in time, killing it"
            ),
        }
        engine.close().await;
    }

    fn engine(&mut self) -> Result<&mut ProtocolEngine> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(ServiceError::ServiceStopped);
        };
        if engine.is_alive() {
            Ok(engine)
        } else {
            Err(ServiceError::ServiceStopped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::tests::EDITOR_INFO;
    use crate::transport::scripted::{decoded, ScriptedTransport};
    use crate::transport::Body;

    fn attached(transport: ScriptedTransport) -> EditorService {
        let mut service = EditorService::new(ServiceConfig::default());
        service.attach(Box::new(transport));
        service
    }

    #[tokio::test]
    async fn unstarted_service_is_not_running() {
        let mut service = EditorService::new(ServiceConfig::default());

        assert_eq!(service.state(), EngineState::Uninitialized);
        assert!(!service.is_running().await);
        assert!(matches!(
            service.can_format(Path::new("a.ts")).await,
            Err(ServiceError::ServiceStopped)
        ));
        service.shutdown().await;
        assert_eq!(service.state(), EngineState::Uninitialized);
    }

    #[tokio::test]
    async fn running_service_answers_liveness() {
        let (t, _) = ScriptedTransport::new();
        let mut service = attached(t.reply(1, Body::Success { message_id: 1 }));

        assert_eq!(service.state(), EngineState::Idle);
        assert!(service.is_running().await);
    }

    #[tokio::test]
    async fn crashed_service_is_not_running() {
        let (t, _) = ScriptedTransport::new();
        let mut service = attached(t);

        assert!(!service.is_running().await);
        assert_eq!(service.state(), EngineState::Shutdown);
        assert!(matches!(
            service.format(Path::new("a.ts"), "x", "UTF-8").await,
            Err(ServiceError::ServiceStopped)
        ));
    }

    #[tokio::test]
    async fn format_example() {
        let (t, _) = ScriptedTransport::new();
        let mut service = attached(t.reply(
            9,
            Body::FormatResponse {
                message_id: 1,
                formatted: Some("let x = 1;".into()),
            },
        ));

        let result = service
            .format(Path::new("a.ts"), "let x=1", "UTF-8")
            .await
            .unwrap();
        assert_eq!(result, "let x = 1;");
    }

    #[tokio::test]
    async fn unchanged_format_returns_original_text() {
        let original = "fn main() {\n    println!(\"héllo\");\n}\n";
        let (t, _) = ScriptedTransport::new();
        let mut service = attached(t.reply(
            9,
            Body::FormatResponse {
                message_id: 1,
                formatted: None,
            },
        ));

        let result = service
            .format(Path::new("src/main.rs"), original, "UTF-8")
            .await
            .unwrap();
        assert_eq!(result, original);
    }

    #[tokio::test]
    async fn should_format_unclaimed_extension_contacts_service_once() {
        let info = EditorInfo::parse(EDITOR_INFO).unwrap();
        let (t, written) = ScriptedTransport::new();
        let mut service = attached(t.reply(
            9,
            Body::CanFormatResponse {
                message_id: 1,
                can_format: true,
            },
        ));

        assert!(!service.should_format(Path::new("a.xyz"), &info).await.unwrap());
        assert_eq!(written.lock().unwrap().len(), 1);
        assert_eq!(
            decoded(&written)[0].body,
            Body::CanFormat {
                file_path: "a.xyz".into()
            }
        );
    }

    #[tokio::test]
    async fn should_format_claimed_extension() {
        let info = EditorInfo::parse(EDITOR_INFO).unwrap();
        let (t, _) = ScriptedTransport::new();
        let mut service = attached(
            t.reply(
                9,
                Body::CanFormatResponse {
                    message_id: 1,
                    can_format: true,
                },
            )
            .reply(
                10,
                Body::CanFormatResponse {
                    message_id: 2,
                    can_format: false,
                },
            ),
        );

        assert!(service.should_format(Path::new("a.ts"), &info).await.unwrap());
        // Service says no even though a plugin claims the extension.
        assert!(!service.should_format(Path::new("b.ts"), &info).await.unwrap());
    }

    #[tokio::test]
    async fn remote_error_keeps_service_running() {
        let (t, _) = ScriptedTransport::new();
        let mut service = attached(
            t.reply(
                9,
                Body::Error {
                    message_id: 1,
                    message: "Expected ';'".into(),
                },
            )
            .reply(10, Body::Success { message_id: 2 }),
        );

        let err = service
            .format(Path::new("a.ts"), "let x =", "UTF-8")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RemoteError(_)));
        assert!(service.is_running().await);
    }

    #[tokio::test]
    async fn shutdown_sends_request_and_stops() {
        let (t, written) = ScriptedTransport::new();
        let mut service = attached(t);

        service.shutdown().await;
        assert_eq!(service.state(), EngineState::Shutdown);
        assert_eq!(decoded(&written)[0].body, Body::ShutdownService);

        // Second shutdown does not write again.
        service.shutdown().await;
        assert_eq!(written.lock().unwrap().len(), 1);
        assert!(!service.is_running().await);
    }

    #[tokio::test]
    async fn start_missing_executable() {
        let config = ServiceConfig {
            executable: "/nonexistent/dprint".into(),
            ..ServiceConfig::default()
        };
        let mut service = EditorService::new(config);

        let err = service.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::Spawn { .. }));
        assert_eq!(service.state(), EngineState::Uninitialized);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_service_that_exits_immediately() {
        // `sh editor-service ...` exits at once: no such script here.
        let config = ServiceConfig {
            executable: "/bin/sh".into(),
            read_timeout_seconds: 5,
            ..ServiceConfig::default()
        };
        let mut service = EditorService::new(config);

        service.start().await.unwrap();
        assert!(!service.is_running().await);
        assert_eq!(service.state(), EngineState::Shutdown);

        service.shutdown().await;
        assert_eq!(service.state(), EngineState::Shutdown);
    }
}
