// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-session")]
#[command(about = "Drive a camera capture session from the command line")]
#[command(version = camera_session::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List {
        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Take a photo
    Photo {
        /// Camera index to use (from 'camera-session list')
        #[arg(short, long)]
        camera: Option<usize>,

        /// Output file path (default: ~/Pictures/camera/IMG_TIMESTAMP.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record a video
    Video {
        /// Camera index to use (from 'camera-session list')
        #[arg(short, long)]
        camera: Option<usize>,

        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Output file path (default: ~/Videos/camera/VID_TIMESTAMP.bin)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_session=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { json } => cli::list_cameras(json),
        Commands::Photo { camera, output } => cli::take_photo(camera, output),
        Commands::Video {
            camera,
            duration,
            output,
        } => cli::record_video(camera, duration, output),
    }
}
