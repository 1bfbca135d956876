//! # aqmon
//!
//! Command-line front end for the SDS011 acquisition pipeline.
//!
//! ## Usage
//! ```bash
//! # Record readings until Ctrl-C
//! aqmon monitor --device /dev/ttyUSB0
//!
//! # Show the newest readings
//! aqmon history -n 20
//!
//! # Readings inside a time range
//! aqmon window --since 2024-05-01T00:00:00Z --until 2024-05-02T00:00:00Z --json
//! ```

mod commands;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "aqmon",
    about = "Particulate sensor acquisition and history",
    version
)]
struct Cli {
    /// Path to a JSON settings file (defaults to ./aqmon.json when present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Reading store location; overrides settings and AQMON_DB.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the sensor, store readings and print them until interrupted.
    Monitor {
        /// Serial device node, e.g. /dev/ttyUSB0.
        #[arg(long, conflicts_with = "describe")]
        device: Option<PathBuf>,

        /// Pick the first port whose description contains this text.
        #[arg(long)]
        describe: Option<String>,

        /// Send the query-data command before each read.
        #[arg(long)]
        query_mode: bool,

        /// Print readings as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Print the most recent readings, newest first.
    History {
        /// Number of readings (defaults to the settings' history limit).
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Print readings between two RFC 3339 instants, oldest first.
    Window {
        #[arg(long)]
        since: DateTime<Utc>,

        #[arg(long)]
        until: DateTime<Utc>,

        #[arg(long)]
        json: bool,
    },

    /// List serial ports visible to the OS.
    Ports,

    /// Write a settings file populated with defaults.
    InitConfig {
        /// Destination (defaults to ./aqmon.json).
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    aqmon_lib::utils::init_logging(cli.verbose);

    let overrides = commands::Overrides {
        config: cli.config,
        db: cli.db,
    };

    match cli.command {
        Commands::Monitor {
            device,
            describe,
            query_mode,
            json,
        } => {
            let mut settings = commands::load_settings(&overrides)?;
            commands::monitor::apply_device_flags(&mut settings, device, describe, query_mode);
            settings.validate()?;
            commands::monitor::execute(settings, json).await
        }
        Commands::History { limit, json } => {
            let settings = commands::load_settings(&overrides)?;
            commands::history::execute(settings, limit, json).await
        }
        Commands::Window { since, until, json } => {
            let settings = commands::load_settings(&overrides)?;
            commands::history::execute_window(settings, since, until, json).await
        }
        Commands::Ports => commands::ports::execute(),
        Commands::InitConfig { path, force } => commands::init_config::execute(path, force),
    }
}
