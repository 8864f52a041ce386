use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use rss_digest::{DigestPipeline, Item, PipelineConfig, RunReport, SourceReport};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rss-digest", about = "Fetch, dedup and rank RSS feeds into a digest")]
struct Cli {
    /// Feed configuration file
    #[arg(long, default_value = "config/feeds.json")]
    config: PathBuf,

    /// Write the digest JSON here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Abort the run after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[derive(Serialize)]
struct DigestOutput<'a> {
    generated_at: DateTime<Utc>,
    items: &'a [Item],
    sources: &'a [SourceReport],
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Starting rss-digest with config {}", cli.config.display());

    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    let pipeline = DigestPipeline::from_config(config).context("failed to build feed client")?;

    let report = match cli.deadline_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), pipeline.run())
            .await
            .with_context(|| format!("run did not finish within {}s", secs))?,
        None => pipeline.run().await,
    };

    for source in report.failed_sources() {
        error!(
            "{} failed: {}",
            source.source_name,
            source.error.as_deref().unwrap_or("unknown error")
        );
    }
    if report.is_empty() {
        warn!("Nothing new to publish");
    }

    write_output(&report, cli.output.as_ref())?;
    info!(
        "Digest finished: {} items, {} sources, {} cached fingerprints",
        report.items().len(),
        report.sources.len(),
        report.cache_entries
    );
    Ok(())
}

fn write_output(report: &RunReport, output: Option<&PathBuf>) -> Result<()> {
    let digest = DigestOutput {
        generated_at: report.started_at,
        items: report.items(),
        sources: &report.sources,
    };
    let json = serde_json::to_string_pretty(&digest)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote digest to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
