mod cli;

use std::time::Duration;

use clap::Parser;
use tracing::info;

use carrier_bridge_engine::carrier::LoopbackAdapter;
use carrier_bridge_engine::config::{PipelineConfig, UpstreamConfig};
use carrier_bridge_engine::{Direction, SessionRegistry};
use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();

    let cli = Cli::parse();

    let mut pipeline_config = PipelineConfig {
        upstream: UpstreamConfig {
            base_url: cli.upstream_url.clone(),
            api_key: cli.upstream_api_key.clone(),
            language: cli.upstream_language.clone(),
        },
        ..PipelineConfig::default()
    };
    pipeline_config.jitter.min_ms = cli.jitter_min_ms;
    pipeline_config.jitter.max_ms = cli.jitter_max_ms;
    pipeline_config.breathing.enabled = !cli.no_breathing;
    pipeline_config.pauses.enabled = !cli.no_pauses;
    let pipeline_config = pipeline_config.build()?;

    info!(
        upstream = %cli.upstream_url,
        jitter_min_ms = cli.jitter_min_ms,
        jitter_max_ms = cli.jitter_max_ms,
        "🚀 carrier-bridge-engine demo starting"
    );

    let (adapter, mut carrier_egress_rx) = LoopbackAdapter::new(256);

    let registry = SessionRegistry::new();
    registry
        .create_session("demo-call", Direction::Inbound, pipeline_config, Box::new(adapter))
        .await?;

    // Feed the carrier's own egress straight back in as ingress, so the
    // demo call stays alive without a real carrier transport.
    let loop_registry = registry.clone();
    tokio::spawn(async move {
        while let Some(frame) = carrier_egress_rx.recv().await {
            let _ = loop_registry.push_ingress("demo-call", frame).await;
        }
    });

    let stats_interval = Duration::from_secs(cli.stats_interval_secs.max(1));
    let stats_registry = registry.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(stats_interval);
        loop {
            ticker.tick().await;
            let active = stats_registry.active_count().await;
            info!(active_calls = active, "[STATS] pipeline status");
        }
    });

    info!("✅ demo call running — Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    registry.terminate("demo-call").await.ok();

    Ok(())
}
