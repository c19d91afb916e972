use std::fmt::Write as _;
use std::path::PathBuf;

use affinity_core::{ClusterSnapshot, PlacementConfig, ReplicaSuffixNormalizer};
use affinity_placement::{PlacementOrchestrator, PlacementReport};
use anyhow::Context;
use clap::ValueEnum;
use tokio::sync::watch;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub struct PlaceOptions {
    pub snapshot: PathBuf,
    pub config: Option<PathBuf>,
    pub strategy: Option<String>,
    pub seed: Option<u64>,
    pub format: OutputFormat,
}

pub async fn place(options: PlaceOptions) -> anyhow::Result<()> {
    let mut config = match &options.config {
        Some(path) => PlacementConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlacementConfig::default(),
    };
    if let Some(strategy) = &options.strategy {
        config.strategy = strategy.parse()?;
    }
    if options.seed.is_some() {
        config.seed = options.seed;
    }

    let state = ClusterSnapshot::from_file(&options.snapshot)
        .with_context(|| format!("Failed to read snapshot {}", options.snapshot.display()))?
        .into_state(config.metric, &ReplicaSuffixNormalizer)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let orchestrator = PlacementOrchestrator::new(config).with_cancel(cancel_rx);

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling placement");
            let _ = cancel_tx.send(true);
        }
    });
    let result = tokio::task::spawn_blocking(move || orchestrator.run(&state)).await?;
    interrupt.abort();
    let report = result?;

    match options.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", format_report(&report)),
    }
    Ok(())
}

pub fn format_report(report: &PlacementReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Strategy: {}", report.strategy);
    let _ = write!(out, "Attempts: {}", report.attempts);
    if let Some(alpha) = report.alpha {
        let _ = write!(out, " (alpha {alpha:.2})");
    }
    if let Some(k) = report.k {
        let _ = write!(out, " (k {k})");
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Cross-host traffic: {:.2} → {:.2} (saved {:.2})",
        report.traffic_before,
        report.traffic_after,
        report.traffic_saved()
    );

    for (host, services) in report.placement.hosts() {
        if services.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{host}");
        for service in services {
            let _ = writeln!(out, "  {service}");
        }
    }
    out
}
