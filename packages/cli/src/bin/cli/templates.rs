// ABOUTME: CLI commands for the image template directory
// ABOUTME: Writes the bundled templates so missing images can be built on demand

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use std::path::PathBuf;
use vbox_boxes::templates;
use vbox_config::AppConfig;

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// Write the bundled templates, replacing existing copies
    Init {
        /// Target directory (defaults to the configured templates directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

pub fn handle_template_command(command: TemplateCommands, config: &AppConfig) -> Result<()> {
    match command {
        TemplateCommands::Init { dir } => {
            let dir = dir.unwrap_or_else(|| config.templates_dir.clone());
            let written = templates::init(&dir)?;

            println!("{} Templates written to {}", "✅".green(), dir.display());
            for path in written {
                println!("  {}", path.display().to_string().dimmed());
            }
            Ok(())
        }
    }
}
