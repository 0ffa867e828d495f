//! Siphon CLI
//!
//! Operator tool for validating replication-pipeline configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Siphon - replication pipeline configuration validator
#[derive(Parser)]
#[command(name = "siphon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory or siphon.yaml path
    #[arg(short, long, default_value = ".")]
    project: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate pipeline configuration without touching any database
    Validate {
        /// Validate a specific pipeline only
        #[arg(long)]
        pipeline: Option<String>,

        /// Print a machine-readable JSON report to stdout
        #[arg(long)]
        json: bool,
    },

    /// Resolve or check a {group.sources.*.key} reference
    CheckRef {
        /// The reference text, e.g. "{asma.sources.*.customer_id}"
        reference: String,

        /// Resolve for this source instead of checking all sources
        #[arg(short, long)]
        source: Option<String>,

        /// Environment to resolve in (with --source)
        #[arg(short, long)]
        env: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so --json output on stdout stays parseable.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Validate { pipeline, json } => {
            commands::validate::run(&cli.project, pipeline.as_deref(), json)?;
        }
        Commands::CheckRef {
            reference,
            source,
            env,
        } => {
            commands::check_ref::run(&cli.project, &reference, source.as_deref(), env.as_deref())?;
        }
    }

    Ok(())
}
