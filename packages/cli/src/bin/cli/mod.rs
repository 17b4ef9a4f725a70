// ABOUTME: Command modules for the vbox binary and the context they share
// ABOUTME: The context owns the configuration, runtime-backed manager and cancellation token

use anyhow::{Context as _, Result};
use colored::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use vbox_boxes::{BoxManager, DockerRuntime};
use vbox_config::AppConfig;

pub mod boxes;
pub mod images;
pub mod templates;

pub struct Context {
    pub config: AppConfig,
    pub manager: BoxManager,
    pub cancel: CancellationToken,
}

impl Context {
    /// Connect to Docker and wire up the box manager
    pub async fn connect(config: AppConfig, cancel: CancellationToken) -> Result<Self> {
        debug!(
            "Using config dir {} and templates dir {}",
            config.config_dir.display(),
            config.templates_dir.display()
        );
        let runtime = DockerRuntime::new().context("Failed to create Docker client")?;
        runtime
            .ping()
            .await
            .context("Docker is not reachable, is the daemon running?")?;

        let manager = BoxManager::new(&config, Arc::new(runtime));
        Ok(Self {
            config,
            manager,
            cancel,
        })
    }
}

/// Build output goes to stdout, dimmed so it reads apart from our own messages
pub fn print_build_line(line: &str) {
    println!("{}", line.dimmed());
}
