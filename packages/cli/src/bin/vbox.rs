// ABOUTME: Entry point for the vbox binary
// ABOUTME: Parses the command line, sets up logging and Ctrl-C cancellation, then dispatches

use clap::{Parser, Subcommand};
use colored::*;
use std::process;
use tokio_util::sync::CancellationToken;
use vbox_config::AppConfig;

mod cli;

use cli::boxes::{BoxCommands, RunArgs};
use cli::images::{ImageCommands, RmiArgs};
use cli::templates::TemplateCommands;
use cli::Context;

#[derive(Parser)]
#[command(name = "vbox")]
#[command(about = "vbox - disposable development boxes you can SSH into")]
#[command(version)]
struct Cli {
    /// Log at debug level unless VBOX_LOG or RUST_LOG say otherwise
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage boxes
    #[command(subcommand, name = "box")]
    Boxes(BoxCommands),
    /// Manage box images
    #[command(subcommand)]
    Image(ImageCommands),
    /// Manage image templates
    #[command(subcommand)]
    Template(TemplateCommands),
    /// List boxes (same as `box list`)
    #[command(alias = "ls")]
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Create and start a box (same as `box run`)
    Run(RunArgs),
    /// Stop a box (same as `box stop`)
    Stop {
        /// Box name or container ID
        id: String,
    },
    /// Stop and remove a box (same as `box rm`)
    Rm {
        /// Box name or container ID
        id: String,
    },
    /// List images (same as `image list`)
    Images {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Remove an image (same as `image rmi`)
    Rmi(RmiArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    vbox_cli::logging::init(cli.verbose);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, cancelling...".yellow());
            on_interrupt.cancel();
        }
    });

    if let Err(e) = handle_command(cli.command, cancel).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands, cancel: CancellationToken) -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    // Everything except templates needs the runtime
    let command = match command {
        Commands::Template(template_cmd) => {
            return cli::templates::handle_template_command(template_cmd, &config)
        }
        Commands::Boxes(box_cmd) => RuntimeCommand::Box(box_cmd),
        Commands::List { json } => RuntimeCommand::Box(BoxCommands::List { json }),
        Commands::Run(args) => RuntimeCommand::Box(BoxCommands::Run(args)),
        Commands::Stop { id } => RuntimeCommand::Box(BoxCommands::Stop { id }),
        Commands::Rm { id } => RuntimeCommand::Box(BoxCommands::Rm { id }),
        Commands::Image(image_cmd) => RuntimeCommand::Image(image_cmd),
        Commands::Images { json } => RuntimeCommand::Image(ImageCommands::List { json }),
        Commands::Rmi(args) => RuntimeCommand::Image(ImageCommands::Rmi(args)),
    };

    let ctx = Context::connect(config, cancel).await?;
    match command {
        RuntimeCommand::Box(box_cmd) => cli::boxes::handle_box_command(box_cmd, &ctx).await,
        RuntimeCommand::Image(image_cmd) => cli::images::handle_image_command(image_cmd, &ctx).await,
    }
}

/// Shortcuts resolved to their full command
enum RuntimeCommand {
    Box(BoxCommands),
    Image(ImageCommands),
}
