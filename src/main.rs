//! Lead discovery CLI: fetch the newest posts from a set of subreddits,
//! score them for help-seeking intent and print the qualified leads as JSON.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use lead_discovery::ai_adapter::build_client_from_config;
use lead_discovery::config::{AiConfig, PipelineConfig};
use lead_discovery::ingest::providers::{RedditClient, RedditConfig};
use lead_discovery::logging::init_tracing;
use lead_discovery::metrics::Metrics;
use lead_discovery::store::MemoryStore;
use lead_discovery::{LeadQuery, Pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subreddit to scan (repeatable)
    #[arg(long = "channel", short = 'c')]
    channels: Vec<String>,

    /// What the business offers; drives both scoring and discovery
    #[arg(long, env = "LEAD_DESCRIPTION", default_value = "")]
    description: String,

    #[arg(long, env = "LEAD_COMPANY", default_value = "")]
    company: String,

    #[arg(long, env = "LEAD_NICHE", default_value = "")]
    niche: String,

    /// Posts per channel (clamped to the configured maximum)
    #[arg(long)]
    per_channel: Option<i64>,

    /// Identity for seen-id tracking and per-user rate limiting
    #[arg(long, env = "LEAD_USER", default_value = "cli")]
    user: String,

    /// Suggest channels instead of scanning
    #[arg(long)]
    discover: bool,

    /// Probe the content source, reasoning service and store, then exit
    #[arg(long)]
    check: bool,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let cfg = PipelineConfig::load_default().context("loading pipeline config")?;
    let ai = AiConfig::load_default().context("loading AI config")?;
    let metrics = if cli.metrics {
        Some(Metrics::init(&cfg)?)
    } else {
        None
    };

    let reddit = RedditClient::new(RedditConfig::from_env()?)?;
    let client = build_client_from_config(&ai);
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(cfg, &ai, Arc::new(reddit), client, store.clone());

    info!(
        provider = %ai.provider,
        ai_enabled = ai.enabled,
        "lead discovery starting"
    );

    if cli.check {
        let report = pipeline.health_check().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if cli.discover {
        let suggestions = pipeline
            .discover_channels(&cli.description, &cli.company, &cli.niche)
            .await;
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
    } else {
        let query = LeadQuery {
            channels: cli.channels,
            description: cli.description,
            company: cli.company,
            niche: cli.niche,
            per_channel: cli.per_channel,
        };
        let outcome = pipeline.run_query(&cli.user, &query, store.as_ref()).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    pipeline.stats().log_summary();
    if let Some(m) = metrics {
        eprintln!("{}", m.render());
    }
    Ok(())
}
