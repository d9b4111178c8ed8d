//! CuyTrace - custody lifecycle for supply-chain lots on a ledger contract
//!
//! Drives the full lot lifecycle (create, process, transfer, telemetry,
//! inspect, reject) against a local file-persisted ledger double, plus the
//! public per-lot trace lookup.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use cuytrace::cli::commands;
use cuytrace::config::Config;

/// CuyTrace custody lifecycle CLI
#[derive(Parser)]
#[command(name = "cuytrace")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "cuytrace.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new lot with its origin certificate
    Create {
        /// Product description
        product: String,

        /// Origin certificate content reference
        #[arg(long)]
        origin: Option<String>,

        /// Local certificate file to pin instead of a reference
        #[arg(long, conflicts_with = "origin")]
        certificate: Option<PathBuf>,

        /// Role to sign as
        #[arg(long = "as", value_name = "ROLE", default_value = "producer")]
        as_role: String,
    },

    /// Attach the processing certificate and advance the lot
    Process {
        /// Lot id
        id: u64,

        /// Processing certificate content reference
        #[arg(long)]
        reference: Option<String>,

        /// Local certificate file to pin instead of a reference
        #[arg(long, conflicts_with = "reference")]
        certificate: Option<PathBuf>,

        /// Role to sign as
        #[arg(long = "as", value_name = "ROLE", default_value = "processor")]
        as_role: String,
    },

    /// Hand custody of a lot to the next actor
    Transfer {
        /// Lot id
        id: u64,

        /// Destination tag: LOGISTICS or RETAIL
        destination: String,

        /// Destination wallet (defaults to the directory identity)
        #[arg(long)]
        to: Option<String>,

        /// Role to sign as
        #[arg(long = "as", value_name = "ROLE", default_value = "processor")]
        as_role: String,
    },

    /// Record a telemetry reading for a lot in transit
    Telemetry {
        /// Lot id
        id: u64,

        /// Temperature in °C
        temperature: i64,

        /// GPS coordinates as decimal "lat,lng"
        coordinates: String,

        /// Role to sign as
        #[arg(long = "as", value_name = "ROLE", default_value = "logistics")]
        as_role: String,
    },

    /// Attach the inspection act and finalize the lot
    Inspect {
        /// Lot id
        id: u64,

        /// Inspection act content reference
        #[arg(long)]
        act: Option<String>,

        /// Local act file to pin instead of a reference
        #[arg(long, conflicts_with = "act")]
        certificate: Option<PathBuf>,

        /// Approve the lot (omit to finalize as rejected)
        #[arg(long)]
        approved: bool,

        /// Role to sign as
        #[arg(long = "as", value_name = "ROLE", default_value = "auditor")]
        as_role: String,
    },

    /// Permanently reject a lot
    Reject {
        /// Lot id
        id: u64,

        /// Rejection reason
        reason: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,

        /// Role to sign as
        #[arg(long = "as", value_name = "ROLE", default_value = "retail")]
        as_role: String,
    },

    /// Public lookup of a lot's lifecycle by id
    Trace {
        /// Lot id
        id: u64,

        /// Emit the raw trace as JSON
        #[arg(long)]
        json: bool,
    },

    /// Number of lots ever created
    Count,

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cuytrace=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Create {
            product,
            origin,
            certificate,
            as_role,
        } => commands::create(&config, &as_role, &product, origin, certificate).await,
        Commands::Process {
            id,
            reference,
            certificate,
            as_role,
        } => commands::process(&config, &as_role, id, reference, certificate).await,
        Commands::Transfer {
            id,
            destination,
            to,
            as_role,
        } => commands::transfer(&config, &as_role, id, &destination, to).await,
        Commands::Telemetry {
            id,
            temperature,
            coordinates,
            as_role,
        } => commands::telemetry(&config, &as_role, id, temperature, &coordinates).await,
        Commands::Inspect {
            id,
            act,
            certificate,
            approved,
            as_role,
        } => commands::inspect(&config, &as_role, id, act, certificate, approved).await,
        Commands::Reject {
            id,
            reason,
            force,
            as_role,
        } => commands::reject(&config, &as_role, id, &reason, force).await,
        Commands::Trace { id, json } => commands::trace(&config, id, json).await,
        Commands::Count => commands::count(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
