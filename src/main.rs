// SPDX-License-Identifier: GPL-3.0-only

use capture_surface::backends::camera::{CameraBackendType, FacingMode};
use capture_surface::constants::APP_DIR_NAME;
use capture_surface::{CaptureSurfaceController, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "capture-surface")]
#[command(about = "Live camera capture surface")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    /// Use the synthetic camera source instead of real hardware
    #[arg(long = "virtual", global = true)]
    use_virtual: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the terminal status viewer (default)
    Terminal {
        /// Directory captured photos are written to
        #[arg(short, long)]
        photo_dir: Option<PathBuf>,
    },

    /// List available cameras
    List,

    /// Take a photo
    Photo {
        /// Camera to use: user/front or environment/back
        #[arg(short, long)]
        facing: Option<FacingMode>,

        /// Output file or directory (default: ~/Pictures/capture-surface/IMG_TIMESTAMP.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Terminal { photo_dir: None });
    init_logging(matches!(command, Commands::Terminal { .. }));

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if cli.use_virtual {
        config.backend = CameraBackendType::Virtual;
    }

    match command {
        Commands::Terminal { photo_dir } => {
            let surface = CaptureSurfaceController::from_config(&config)?;
            let photo_dir = photo_dir.or_else(|| Some(cli::get_default_photo_dir()));
            capture_surface::terminal::run(surface, photo_dir)
        }
        Commands::List => cli::list_cameras(&config),
        Commands::Photo { facing, output } => cli::take_photo(&config, facing, output),
    }
}

/// Initialize logging
///
/// Set RUST_LOG to control the level (e.g. RUST_LOG=capture_surface=debug).
/// The terminal viewer owns the screen, so its logs go to a file.
fn init_logging(to_file: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let log_file = to_file
        .then(|| dirs::cache_dir().map(|dir| dir.join(APP_DIR_NAME)))
        .flatten()
        .and_then(|dir| {
            std::fs::create_dir_all(&dir).ok()?;
            std::fs::File::create(dir.join("terminal.log")).ok()
        });

    match log_file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init(),
        None if to_file => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .init(),
    }
}
