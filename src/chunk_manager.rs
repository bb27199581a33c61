//! Picks an output chunk size from recent latency/jitter history and
//! splits egress audio into chunks of that size.

use std::collections::VecDeque;

use crate::config::ChunkConfig;

/// Number of recent observations retained for the chunk-size policy.
const HISTORY_LEN: usize = 20;

pub struct ChunkManager {
    config: ChunkConfig,
    latency_ms: VecDeque<f64>,
    jitter_ms: VecDeque<f64>,
}

impl ChunkManager {
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            latency_ms: VecDeque::with_capacity(HISTORY_LEN),
            jitter_ms: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Record one round-trip latency / jitter sample, evicting the
    /// oldest observation once the window is full.
    pub fn observe(&mut self, latency_ms: f64, jitter_ms: f64) {
        if self.latency_ms.len() >= HISTORY_LEN {
            self.latency_ms.pop_front();
        }
        self.latency_ms.push_back(latency_ms);

        if self.jitter_ms.len() >= HISTORY_LEN {
            self.jitter_ms.pop_front();
        }
        self.jitter_ms.push_back(jitter_ms);
    }

    /// Derive the optimal chunk size from the observation history.
    /// With no history yet, returns `config.default_ms`. A clearly bad
    /// network (latency > 200ms or jitter > 100ms) picks `min_ms`; a
    /// clearly good one (latency < 50ms and jitter < 20ms) picks
    /// `max_ms`; otherwise the size is interpolated between the two
    /// using a quality score derived from both metrics.
    pub fn calculate_optimal_chunk_ms(&self) -> u32 {
        if self.latency_ms.is_empty() {
            return self.config.default_ms;
        }

        let mean_latency = self.latency_ms.iter().sum::<f64>() / self.latency_ms.len() as f64;
        let mean_jitter = if self.jitter_ms.is_empty() {
            0.0
        } else {
            self.jitter_ms.iter().sum::<f64>() / self.jitter_ms.len() as f64
        };

        let min = self.config.min_ms as f64;
        let max = self.config.max_ms as f64;

        if mean_latency > 200.0 || mean_jitter > 100.0 {
            return self.config.min_ms;
        }
        if mean_latency < 50.0 && mean_jitter < 20.0 {
            return self.config.max_ms;
        }

        let quality = 1.0 - (mean_latency / 200.0 + mean_jitter / 100.0).min(1.0);
        let chunk_ms = min + quality * (max - min);
        chunk_ms.round().clamp(min, max) as u32
    }

    /// Split `payload` (bytes at `bytes_per_ms`) into chunks of
    /// `calculate_optimal_chunk_ms()` length. The final chunk may be
    /// shorter than the target if `payload` doesn't divide evenly.
    pub fn split(&self, payload: &[u8], bytes_per_ms: f64) -> Vec<Vec<u8>> {
        if payload.is_empty() {
            return Vec::new();
        }

        let chunk_ms = self.calculate_optimal_chunk_ms();
        let chunk_bytes = ((chunk_ms as f64) * bytes_per_ms).round().max(1.0) as usize;

        payload.chunks(chunk_bytes).map(|c| c.to_vec()).collect()
    }
}
