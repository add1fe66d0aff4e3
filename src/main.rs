//! dprint editor client
//!
//! Command-line stand-in for an editor integration: starts the dprint
//! editor service, formats one file the way a save hook would, and shuts
//! the service down again.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dprint_editor_client::{config::ServiceConfig, EditorService};

#[derive(Parser, Debug)]
#[command(name = "dprint-editor-client")]
#[command(about = "Format files through the dprint editor service")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the dprint executable (overrides configuration)
    #[arg(long)]
    dprint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed plugins and the extensions they claim
    Info {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Check whether a file would be formatted
    Check { file: PathBuf },
    /// Format a file and print the result
    Format {
        file: PathBuf,

        /// Write the result back instead of printing it
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr so stdout is free for formatted output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ServiceConfig::from_env(),
    };
    if let Some(dprint) = args.dprint {
        config.executable = dprint;
    }

    match args.command {
        Command::Info { dir } => {
            let service = EditorService::new(config);
            let info = service
                .query_capabilities(&dir)
                .await
                .context("Failed to query dprint editor info")?;
            for plugin in &info.plugins {
                println!("{} {}: {}", plugin.name, plugin.version, plugin.file_extensions.join(", "));
            }
        }
        Command::Check { file } => {
            let mut service = EditorService::new(config);
            service.start().await.context("Failed to start dprint editor service")?;
            let result = should_format(&mut service, &file).await;
            service.shutdown().await;
            println!("{}", result?);
        }
        Command::Format { file, write } => {
            let mut service = EditorService::new(config);
            service.start().await.context("Failed to start dprint editor service")?;
            let result = format_file(&mut service, &file, write).await;
            service.shutdown().await;
            result?;
        }
    }

    Ok(())
}

async fn should_format(service: &mut EditorService, file: &Path) -> Result<bool> {
    if !service.is_running().await {
        warn!("dprint editor service is not running");
        return Ok(false);
    }
    let file = std::path::absolute(file).context("Failed to resolve file path")?;
    let dir = file.parent().unwrap_or_else(|| Path::new("."));

    let info = service
        .query_capabilities(dir)
        .await
        .context("Failed to query dprint editor info")?;
    Ok(service.should_format(&file, &info).await?)
}

async fn format_file(service: &mut EditorService, file: &Path, write: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if !should_format(service, file).await? {
        info!(file = %file.display(), "File is not handled by any dprint plugin");
        if !write {
            print!("{text}");
        }
        return Ok(());
    }

    let absolute = std::path::absolute(file).context("Failed to resolve file path")?;
    let formatted = service
        .format(&absolute, &text, "UTF-8")
        .await
        .with_context(|| format!("Failed to format {}", file.display()))?;

    if write {
        if formatted != text {
            tokio::fs::write(file, &formatted)
                .await
                .with_context(|| format!("Failed to write {}", file.display()))?;
            info!(file = %file.display(), "Formatted");
        }
    } else {
        print!("{formatted}");
    }
    Ok(())
}
