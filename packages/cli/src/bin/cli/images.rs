// ABOUTME: CLI commands for box images (build, list, rmi)
// ABOUTME: Streams build output to the terminal and renders image tables

use super::{print_build_line, Context};
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::*;
use std::path::PathBuf;
use vbox_boxes::ImageRef;
use vbox_cli::output::images_table;

#[derive(Subcommand)]
pub enum ImageCommands {
    /// Build an image from a Dockerfile
    Build(BuildArgs),
    /// List vbox images
    #[command(alias = "ls")]
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Remove an image by ID or name:version
    Rmi(RmiArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Path to the Dockerfile; its directory is the build context
    #[arg(short = 'f', long = "file")]
    pub dockerfile: PathBuf,

    /// Image name
    #[arg(short, long)]
    pub name: String,

    /// Image version
    #[arg(short = 'v', long = "version")]
    pub version: String,
}

#[derive(Args)]
pub struct RmiArgs {
    /// Image ID (full or prefix) or name:version
    pub id: String,

    /// Remove even if containers use the image
    #[arg(long)]
    pub force: bool,
}

pub async fn handle_image_command(command: ImageCommands, ctx: &Context) -> Result<()> {
    match command {
        ImageCommands::Build(args) => build_image(ctx, args).await,
        ImageCommands::List { json } => list_images(ctx, json).await,
        ImageCommands::Rmi(args) => remove_image(ctx, args).await,
    }
}

async fn build_image(ctx: &Context, args: BuildArgs) -> Result<()> {
    let image: ImageRef = format!("{}:{}", args.name, args.version).parse()?;

    println!("{}", format!("🐋 Building image {}", image).blue().bold());
    println!("📄 Using Dockerfile: {}", args.dockerfile.display());

    ctx.manager
        .images()
        .build_from_dockerfile(&args.dockerfile, &image, &ctx.cancel, &print_build_line)
        .await?;

    println!("{} Built image {}", "✅".green(), image);
    Ok(())
}

async fn list_images(ctx: &Context, json: bool) -> Result<()> {
    let images = ctx.manager.images().list(&ctx.cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&images)?);
        return Ok(());
    }

    if images.is_empty() {
        println!("{}", "No images found".yellow());
        println!(
            "{}",
            "Images are built on first 'vbox run', or with 'vbox image build'".dimmed()
        );
        return Ok(());
    }

    println!("{}", images_table(&images));
    Ok(())
}

async fn remove_image(ctx: &Context, args: RmiArgs) -> Result<()> {
    ctx.manager
        .images()
        .remove(&args.id, args.force, &ctx.cancel)
        .await?;
    println!("{} Removed image {}", "✅".green(), args.id);
    Ok(())
}
