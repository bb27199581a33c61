use clap::Parser;

/// Process-level configuration for the demo runtime harness. These are
/// the knobs a deployment picks at process start; per-call tuning
/// lives in [`crate::config::PipelineConfig`].
#[derive(Parser, Debug, Clone)]
#[command(name = "carrier-bridge-demo", about = "Runtime harness driving a loopback call through the pipeline")]
pub struct Cli {
    /// Upstream conversation service WebSocket URL.
    #[arg(long, env = "UPSTREAM_URL", default_value = "wss://localhost/ws/conversation")]
    pub upstream_url: String,

    /// API key for the upstream conversation service.
    #[arg(long, env = "UPSTREAM_API_KEY", default_value = "")]
    pub upstream_api_key: String,

    /// Language hint passed to the upstream conversation service.
    #[arg(long, env = "UPSTREAM_LANGUAGE", default_value = "en")]
    pub upstream_language: String,

    /// How often to log aggregated pipeline statistics.
    #[arg(long, default_value_t = 10)]
    pub stats_interval_secs: u64,

    /// Jitter buffer minimum target depth, in milliseconds.
    #[arg(long, default_value_t = 20)]
    pub jitter_min_ms: u32,

    /// Jitter buffer maximum target depth, in milliseconds.
    #[arg(long, default_value_t = 200)]
    pub jitter_max_ms: u32,

    /// Disable synthetic breathing-noise insertion.
    #[arg(long, default_value_t = false)]
    pub no_breathing: bool,

    /// Disable punctuation-derived pause insertion.
    #[arg(long, default_value_t = false)]
    pub no_pauses: bool,
}
