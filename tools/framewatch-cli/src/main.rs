//! Framewatch CLI — Command-line driver for the motion pipeline.
//!
//! Usage:
//!   framewatch simulate [OPTIONS]     Run the detector on a synthetic moving square
//!   framewatch analyze <DIR>          Run the detector over an image sequence
//!   framewatch config show            Print the effective configuration
//!   framewatch config init            Write the default configuration file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use framewatch_common::config::{AppConfig, LoggingConfig};

mod commands;
mod output;
mod sequence;
mod synthetic;

use commands::DetectorArgs;

#[derive(Parser)]
#[command(
    name = "framewatch",
    about = "Real-time motion detection over frame streams",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the standard location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detector on a synthetic moving square
    Simulate {
        /// Frame width
        #[arg(long, default_value = "64")]
        width: u32,

        /// Frame height
        #[arg(long, default_value = "48")]
        height: u32,

        /// Frames per second of the synthetic stream
        #[arg(long, default_value = "30")]
        fps: f64,

        /// Number of frames to generate
        #[arg(long, default_value = "90")]
        frames: u64,

        /// Side length of the moving square in pixels
        #[arg(long, default_value = "8")]
        square: u32,

        /// Pace frames in real time and stamp them with the media clock
        #[arg(long)]
        realtime: bool,

        #[command(flatten)]
        detector: DetectorArgs,
    },

    /// Run the detector over a directory of images, in file-name order
    Analyze {
        /// Directory holding PNG, JPEG, or BMP frames
        path: PathBuf,

        /// Frame rate used to timestamp the sequence
        #[arg(long, default_value = "30")]
        fps: f64,

        #[command(flatten)]
        detector: DetectorArgs,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,

    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Creating the file must not require it to exist already.
    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = cli.command
    {
        return commands::config::init(cli.config, force);
    }

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => AppConfig::load(),
    };

    // Initialize logging
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    framewatch_common::logging::init_logging(&LoggingConfig {
        level,
        ..config.logging.clone()
    });

    match cli.command {
        Commands::Simulate {
            width,
            height,
            fps,
            frames,
            square,
            realtime,
            detector,
        } => commands::simulate::run(
            &config, width, height, fps, frames, square, realtime, detector,
        ),
        Commands::Analyze {
            path,
            fps,
            detector,
        } => commands::analyze::run(&config, path, fps, detector),
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&config),
            ConfigAction::Init { force } => commands::config::init(cli.config, force),
        },
    }
}
