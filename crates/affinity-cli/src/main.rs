//! affinityctl — affinity-aware placement from the command line.
//!
//! # Usage
//!
//! ```text
//! affinityctl place --snapshot cluster.json --config placement.toml
//! affinityctl normalize cartservice-5c8d-abcde redis-cart-0
//! affinityctl config > placement.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

use commands::place::OutputFormat;

#[derive(Parser)]
#[command(
    name = "affinityctl",
    about = "Affinity-aware service placement",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a placement from a cluster snapshot.
    ///
    /// The snapshot is the JSON document produced by the metrics collector:
    /// demands, hosts, current placement and affinity.
    Place {
        /// Path to the snapshot JSON file.
        #[arg(short, long)]
        snapshot: PathBuf,
        /// Path to a placement.toml. Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the configured strategy
        /// (migration, binary-partition, k-partition, bisecting).
        #[arg(long)]
        strategy: Option<String>,
        /// Override the configured RNG seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the logical service name of each workload name.
    Normalize {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print the default configuration as TOML.
    Config,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Place {
            snapshot,
            config,
            strategy,
            seed,
            format,
        } => {
            let options = commands::place::PlaceOptions {
                snapshot,
                config,
                strategy,
                seed,
                format,
            };
            commands::place::place(options).await
        }
        Commands::Normalize { names } => commands::normalize::normalize(&names),
        Commands::Config => commands::config::print_default(),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,affinity_placement=info"));

    // stdout carries the report.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
