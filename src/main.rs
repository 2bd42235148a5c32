use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use acp_observer::config::{Config, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "acp-observer",
    version,
    about = "Unattended multi-target imaging scheduler for ACP observatories",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

impl Cli {
    fn config_path(&self) -> Option<&Path> {
        match &self.command {
            Commands::Run { config, .. }
            | Commands::Validate { config }
            | Commands::Status { config } => Some(config),
            Commands::Meridian { config, .. } => config.as_deref(),
        }
    }

    /// Logging section of the config file, if one is given and readable
    fn logging(&self) -> LoggingConfig {
        self.config_path()
            .and_then(|path| Config::from_file(path).ok())
            .map(|config| config.logging)
            .unwrap_or_default()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the observation schedule
    Run {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Use a simulated observatory and clock
        #[arg(long, default_value = "false")]
        dry_run: bool,

        /// Load targets from a saved queue file instead of the config
        #[arg(short, long)]
        queue: Option<PathBuf>,

        /// Save the queue with final statuses after the run
        #[arg(long)]
        save_queue: Option<PathBuf>,
    },

    /// Validate a configuration file and print the schedule
    Validate {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show the next meridian crossing of a coordinate
    Meridian {
        /// Right ascension (HH:MM:SS)
        #[arg(long)]
        ra: String,

        /// Declination ([+-]DD:MM:SS)
        #[arg(long, allow_hyphen_values = true)]
        dec: String,

        /// Observatory latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Observatory longitude in degrees, east positive
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Take location and flip window from a configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the current observatory status
    Status {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    let mut logging = cli.logging();
    if let Some(format) = &cli.log_format {
        logging.format = format.clone();
    }
    setup_tracing(&logging, cli.verbose)?;

    match cli.command {
        Commands::Run {
            config,
            dry_run,
            queue,
            save_queue,
        } => {
            tracing::info!(
                config = %config.display(),
                dry_run = %dry_run,
                queue = ?queue,
                save_queue = ?save_queue,
                "Starting run command"
            );
            commands::run(commands::RunParams {
                config,
                dry_run,
                queue,
                save_queue,
            })
            .await?;
        }

        Commands::Validate { config } => {
            tracing::debug!(config = %config.display(), "Starting validate command");
            commands::validate(&config)?;
        }

        Commands::Meridian {
            ra,
            dec,
            lat,
            lon,
            config,
        } => {
            tracing::debug!(ra = %ra, dec = %dec, lat = ?lat, lon = ?lon, "Starting meridian command");
            commands::meridian(&ra, &dec, lat, lon, config.as_deref())?;
        }

        Commands::Status { config } => {
            tracing::debug!(config = %config.display(), "Starting status command");
            commands::status(&config).await?;
        }
    }

    Ok(())
}

fn setup_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("acp_observer=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("acp_observer={},warn", logging.level))
        })
    };

    match logging.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
