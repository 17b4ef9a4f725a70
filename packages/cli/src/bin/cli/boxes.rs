// ABOUTME: CLI commands for box lifecycle (list, get, run, stop, rm)
// ABOUTME: Prints box tables and connection hints after a successful run

use super::{print_build_line, Context};
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::*;
use std::path::PathBuf;
use vbox_boxes::{BoxInfo, Port, RunRequest, VolumeBind};
use vbox_cli::output::{boxes_table, format_ports};
use vbox_config::constants::{BOX_SSH_PORT, BOX_USER};

#[derive(Subcommand)]
pub enum BoxCommands {
    /// List all boxes, running or stopped
    #[command(alias = "ls")]
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show box details
    Get {
        /// Box name or container ID
        id: String,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Create and start a box, building its image if needed
    Run(RunArgs),
    /// Stop a box
    Stop {
        /// Box name or container ID
        id: String,
    },
    /// Stop and remove a box along with its SSH host entry
    Rm {
        /// Box name or container ID
        id: String,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Image as name:version, built from the matching template when missing
    pub image: String,

    /// Box name, also used as the SSH host alias
    #[arg(short, long)]
    pub name: String,

    /// Publish a port: CONTAINER[/PROTO] or HOST:CONTAINER[/PROTO]
    #[arg(short, long = "publish")]
    pub publish: Vec<Port>,

    /// Host port for SSH (0 picks a free one)
    #[arg(long, default_value = "0")]
    pub ssh_port: u16,

    /// Authorize this public key instead of generating a key pair
    #[arg(long)]
    pub public_key: Option<PathBuf>,

    /// Bind mount: HOST_PATH:CONTAINER_PATH
    #[arg(short, long = "volume")]
    pub volume: Vec<VolumeBind>,
}

pub async fn handle_box_command(command: BoxCommands, ctx: &Context) -> Result<()> {
    match command {
        BoxCommands::List { json } => list_boxes(ctx, json).await,
        BoxCommands::Get { id, json } => show_box(ctx, &id, json).await,
        BoxCommands::Run(args) => run_box(ctx, args).await,
        BoxCommands::Stop { id } => stop_box(ctx, &id).await,
        BoxCommands::Rm { id } => remove_box(ctx, &id).await,
    }
}

async fn list_boxes(ctx: &Context, json: bool) -> Result<()> {
    let boxes = ctx.manager.list(&ctx.cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&boxes)?);
        return Ok(());
    }

    if boxes.is_empty() {
        println!("{}", "No boxes found".yellow());
        println!(
            "{}",
            "Use 'vbox run base:1.0 --name dev' to start your first box".dimmed()
        );
        return Ok(());
    }

    println!("{}", boxes_table(&boxes));
    println!();
    println!("{}", format!("{} box(es)", boxes.len()).dimmed());
    Ok(())
}

async fn show_box(ctx: &Context, id: &str, json: bool) -> Result<()> {
    let info = ctx.manager.get(id, &ctx.cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", format!("📦 Box Details - {}", info.name).blue().bold());
    println!();
    print_box_details(&info);

    if let Ok(entry) = ctx.manager.ssh().get(&info.name) {
        println!("{:<15} ssh {}", "Connect:".cyan(), entry.alias);
    }
    Ok(())
}

fn print_box_details(info: &BoxInfo) {
    println!("{:<15} {}", "ID:".cyan(), info.id);
    println!("{:<15} {}", "Name:".cyan(), info.name);
    println!("{:<15} {}", "Image:".cyan(), info.image);

    let state = match info.state.as_str() {
        "running" => info.state.green(),
        "exited" | "dead" => info.state.red(),
        _ => info.state.yellow(),
    };
    println!("{:<15} {}", "State:".cyan(), state);
    println!("{:<15} {}", "Status:".cyan(), info.status);

    if !info.ports.is_empty() {
        println!("{:<15} {}", "Ports:".cyan(), format_ports(&info.ports));
    }
}

async fn run_box(ctx: &Context, args: RunArgs) -> Result<()> {
    println!(
        "{}",
        format!("🐋 Starting box {} from {}", args.name, args.image)
            .blue()
            .bold()
    );

    let generated_key = args.public_key.is_none();
    let request = RunRequest {
        name: args.name,
        image: args.image,
        ports: args.publish,
        ssh_port: args.ssh_port,
        public_key: args.public_key,
        volumes: args.volume,
    };

    let info = ctx
        .manager
        .run(request, &ctx.cancel, &print_build_line)
        .await?;

    println!();
    println!("{} Box {} is {}", "✅".green(), info.name.bold(), info.state);
    print_box_details(&info);

    let ssh_port = info
        .ports
        .iter()
        .find(|p| p.private_port == BOX_SSH_PORT)
        .map(|p| p.public_port);

    println!();
    if generated_key {
        println!("{:<15} ssh {}", "Connect:".cyan(), info.name);
        println!(
            "{}",
            format!(
                "Host entries live in {}",
                ctx.manager.ssh().config_path().display()
            )
            .dimmed()
        );
    } else if let Some(port) = ssh_port {
        println!(
            "{:<15} ssh -p {} {}@{}",
            "Connect:".cyan(),
            port,
            BOX_USER,
            ctx.config.ssh_host
        );
    }
    Ok(())
}

async fn stop_box(ctx: &Context, id: &str) -> Result<()> {
    ctx.manager.stop(id, &ctx.cancel).await?;
    println!("{} Stopped box {}", "✅".green(), id);
    Ok(())
}

async fn remove_box(ctx: &Context, id: &str) -> Result<()> {
    ctx.manager.remove(id, &ctx.cancel).await?;
    println!("{} Removed box {}", "✅".green(), id);
    Ok(())
}
