//! Capability discovery via `dprint editor-info`.
//!
//! A short-lived invocation, separate from the framed service pipe. It
//! reports the schema version and the installed plugins along with the
//! file extensions and names each one claims.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};

/// Schema version of `editor-info` output this client understands.
pub const EXPECTED_SCHEMA_VERSION: u32 = 4;

/// Output of `dprint editor-info`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorInfo {
    pub schema_version: u32,

    #[serde(default)]
    pub cli_version: Option<String>,

    #[serde(default)]
    pub plugins: Vec<PluginInfo>,
}

/// One installed formatting plugin.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub config_key: Option<String>,

    /// Extensions without the leading dot, e.g. `"ts"`.
    #[serde(default)]
    pub file_extensions: Vec<String>,

    /// Exact file names, e.g. `"Cargo.lock"`.
    #[serde(default)]
    pub file_names: Vec<String>,

    #[serde(default)]
    pub help_url: Option<String>,
}

impl EditorInfo {
    /// Parse `editor-info` JSON and check its schema version.
    pub fn parse(json: &str) -> Result<Self> {
        let info: Self = serde_json::from_str(json)?;
        info.check_schema()?;
        Ok(info)
    }

    fn check_schema(&self) -> Result<()> {
        if self.schema_version == EXPECTED_SCHEMA_VERSION {
            Ok(())
        } else {
            Err(ServiceError::SchemaMismatch {
                expected: EXPECTED_SCHEMA_VERSION,
                actual: self.schema_version,
            })
        }
    }

    /// Every extension claimed by any plugin.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.plugins
            .iter()
            .flat_map(|p| p.file_extensions.iter().map(String::as_str))
    }

    /// Whether any plugin claims `path` by extension or exact file name.
    pub fn supports(&self, path: &Path) -> bool {
        let extension = path.extension().and_then(|e| e.to_str());
        let file_name = path.file_name().and_then(|n| n.to_str());

        if let Some(ext) = extension {
            if self.extensions().any(|e| e.eq_ignore_ascii_case(ext)) {
                return true;
            }
        }
        file_name.is_some_and(|name| {
            self.plugins
                .iter()
                .any(|p| p.file_names.iter().any(|n| n == name))
        })
    }
}

/// Run `<executable> editor-info` in `dir`.
#[instrument(skip(config), fields(exec = %config.executable))]
pub async fn query(config: &ServiceConfig, dir: &Path) -> Result<EditorInfo> {
    debug!(dir = %dir.display(), "Querying editor info");

    let output = tokio::process::Command::new(&config.executable)
        .arg("editor-info")
        .current_dir(dir)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(config.info_timeout(), output)
        .await
        .map_err(|_| {
            ServiceError::CapabilityQuery(format!(
                "editor-info did not finish within {:?}",
                config.info_timeout()
            ))
        })?
        .map_err(|source| ServiceError::Spawn {
            executable: config.executable.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ServiceError::CapabilityQuery(format!(
            "editor-info exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let stdout = String::from_utf8(output.stdout).map_err(|e| {
        ServiceError::CapabilityQuery(format!("editor-info output is not UTF-8: {e}"))
    })?;
    let info = EditorInfo::parse(&stdout)?;

    debug!(
        plugins = info.plugins.len(),
        cli_version = ?info.cli_version,
        "Editor info loaded"
    );
    Ok(info)
}
