use std::collections::HashMap;

use crate::error::PipelineError;

/// Adaptive jitter buffer depth bounds and initial target.
#[derive(Debug, Clone, PartialEq)]
pub struct JitterConfig {
    pub min_ms: u32,
    pub max_ms: u32,
    pub target_ms: u32,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self { min_ms: 20, max_ms: 200, target_ms: 60 }
    }
}

/// Playback rate-adaptation range and crossfade window.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    pub min_rate: f32,
    pub max_rate: f32,
    pub base_rate: f32,
    pub low_watermark: f32,
    pub high_watermark: f32,
    pub crossfade_ms: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            min_rate: 0.95,
            max_rate: 1.05,
            base_rate: 1.0,
            low_watermark: 0.2,
            high_watermark: 0.8,
            crossfade_ms: 20,
        }
    }
}

/// Output chunk size policy bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkConfig {
    pub min_ms: u32,
    pub max_ms: u32,
    pub default_ms: u32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self { min_ms: 100, max_ms: 1000, default_ms: 200 }
    }
}

/// Breathing-burst toggle and base intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct BreathingConfig {
    pub enabled: bool,
    pub intensity: f32,
}

impl Default for BreathingConfig {
    fn default() -> Self {
        Self { enabled: true, intensity: 0.3 }
    }
}

/// Pause-insertion toggle and the punctuation → duration table (ms).
#[derive(Debug, Clone, PartialEq)]
pub struct PauseConfig {
    pub enabled: bool,
    pub durations: HashMap<char, u32>,
    pub sentence_boundary_ms: u32,
}

impl Default for PauseConfig {
    fn default() -> Self {
        let mut durations = HashMap::new();
        durations.insert(',', 150);
        durations.insert('.', 500);
        durations.insert('?', 600);
        durations.insert('!', 200);
        Self { enabled: true, durations, sentence_boundary_ms: 400 }
    }
}

/// Credentials and addressing for the upstream conversation service.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: String,
    pub language: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "wss://localhost/ws/conversation".to_string(),
            api_key: String::new(),
            language: "en".to_string(),
        }
    }
}

/// Immutable pipeline configuration, fixed at session construction.
///
/// This is a closed record: every field has a validated default and
/// construction rejects any combination that violates the invariants
/// below, rather than clamping silently.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineConfig {
    pub jitter: JitterConfig,
    pub playback: PlaybackConfig,
    pub chunk: ChunkConfig,
    pub breathing: BreathingConfig,
    pub pauses: PauseConfig,
    pub upstream: UpstreamConfig,
}

impl PipelineConfig {
    /// Validate the invariants from the data model and return a
    /// `Config` error describing the first violation found.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let j = &self.jitter;
        if !(j.min_ms <= j.target_ms && j.target_ms <= j.max_ms) {
            return Err(PipelineError::Config(format!(
                "jitter.min_ms ({}) <= jitter.target_ms ({}) <= jitter.max_ms ({}) violated",
                j.min_ms, j.target_ms, j.max_ms
            )));
        }

        let p = &self.playback;
        if !(p.min_rate <= 1.0 && 1.0 <= p.max_rate) {
            return Err(PipelineError::Config(format!(
                "playback.min_rate ({}) <= 1.0 <= playback.max_rate ({}) violated",
                p.min_rate, p.max_rate
            )));
        }
        if !(p.low_watermark < p.high_watermark) {
            return Err(PipelineError::Config(format!(
                "playback.low_watermark ({}) < playback.high_watermark ({}) violated",
                p.low_watermark, p.high_watermark
            )));
        }

        let c = &self.chunk;
        if !(c.min_ms <= c.default_ms && c.default_ms <= c.max_ms) {
            return Err(PipelineError::Config(format!(
                "chunk.min_ms ({}) <= chunk.default_ms ({}) <= chunk.max_ms ({}) violated",
                c.min_ms, c.default_ms, c.max_ms
            )));
        }

        Ok(())
    }

    /// Build and validate a config, failing fast on invariant violation.
    pub fn build(self) -> Result<Self, PipelineError> {
        self.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().build().unwrap();
    }

    #[test]
    fn rejects_inverted_jitter_bounds() {
        let mut cfg = PipelineConfig::default();
        cfg.jitter.target_ms = cfg.jitter.max_ms + 1;
        assert!(matches!(cfg.build(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_watermarks_out_of_order() {
        let mut cfg = PipelineConfig::default();
        cfg.playback.low_watermark = 0.9;
        cfg.playback.high_watermark = 0.1;
        assert!(matches!(cfg.build(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_chunk_bounds_excluding_default() {
        let mut cfg = PipelineConfig::default();
        cfg.chunk.default_ms = cfg.chunk.max_ms + 1;
        assert!(matches!(cfg.build(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_rate_bounds_excluding_base() {
        let mut cfg = PipelineConfig::default();
        cfg.playback.max_rate = 0.5;
        assert!(matches!(cfg.build(), Err(PipelineError::Config(_))));
    }
}
