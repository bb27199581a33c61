//! Order-preserving FIFO with an adaptive target depth derived from
//! measured jitter; drops the oldest frames on overflow.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use crate::config::JitterConfig;
use crate::frame::SequencedFrame;

/// Window size for inter-arrival deltas.
const ARRIVAL_WINDOW: usize = 50;
/// How often the target depth is recomputed from the window.
const ADAPTATION_INTERVAL_MS: u64 = 100;
/// Multiplier applied to measured jitter when deriving target depth.
const JITTER_MULTIPLIER: f64 = 2.0;
/// Fallback per-frame duration when a frame's own duration is unknown
/// (`duration_samples == 0`). Not the general model — see `SPEC_FULL.md`.
const FALLBACK_FRAME_MS: f64 = 20.0;

/// Snapshot of the jitter buffer's adaptive state and counters.
#[derive(Debug, Clone, Default)]
pub struct JitterBufferStats {
    pub mean_gap_ms: f64,
    pub jitter_ms: f64,
    pub target_depth_ms: f64,
    pub current_depth_ms: f64,
    pub total: u64,
    pub out_of_order: u64,
    pub duplicate: u64,
    pub lost: u64,
    pub underruns: u64,
    pub overruns: u64,
}

pub struct JitterBuffer {
    config: JitterConfig,
    frames: BTreeMap<u64, SequencedFrame>,
    arrivals: VecDeque<u64>, // inter-arrival deltas, in micros
    last_arrival: Option<Instant>,
    last_adaptation: Instant,
    target_depth_ms: f64,
    stats: JitterBufferStats,
}

impl JitterBuffer {
    pub fn new(config: JitterConfig) -> Self {
        let target_depth_ms = config.target_ms as f64;
        Self {
            config,
            frames: BTreeMap::new(),
            arrivals: VecDeque::with_capacity(ARRIVAL_WINDOW),
            last_arrival: None,
            last_adaptation: Instant::now(),
            target_depth_ms,
            stats: JitterBufferStats::default(),
        }
    }

    fn frame_ms(frame: &SequencedFrame) -> f64 {
        let ms = frame.duration_ms();
        if ms > 0.0 {
            ms
        } else {
            FALLBACK_FRAME_MS
        }
    }

    fn current_depth_ms(&self) -> f64 {
        self.frames.values().map(Self::frame_ms).sum()
    }

    /// Enqueue a frame, ordered by sequence. Never blocks; evicts the
    /// oldest frames if the resulting depth exceeds `max_ms`.
    pub fn enqueue(&mut self, frame: SequencedFrame) {
        self.record_arrival();

        if self.frames.contains_key(&frame.sequence) {
            self.stats.duplicate += 1;
            return;
        }
        self.frames.insert(frame.sequence, frame);

        self.maybe_adapt();
        self.enforce_overflow();
        self.stats.current_depth_ms = self.current_depth_ms();
    }

    fn record_arrival(&mut self) {
        let now = Instant::now();
        if let Some(prev) = self.last_arrival {
            let delta_us = now.duration_since(prev).as_micros() as u64;
            if self.arrivals.len() >= ARRIVAL_WINDOW {
                self.arrivals.pop_front();
            }
            self.arrivals.push_back(delta_us);
        }
        self.last_arrival = Some(now);
    }

    fn maybe_adapt(&mut self) {
        if self.last_adaptation.elapsed().as_millis() < ADAPTATION_INTERVAL_MS as u128 {
            return;
        }
        self.last_adaptation = Instant::now();

        if self.arrivals.len() < 2 {
            return;
        }

        let mean_us = self.arrivals.iter().sum::<u64>() as f64 / self.arrivals.len() as f64;
        let variance = self
            .arrivals
            .iter()
            .map(|&d| {
                let diff = d as f64 - mean_us;
                diff * diff
            })
            .sum::<f64>()
            / self.arrivals.len() as f64;
        let jitter_us = variance.sqrt();

        self.stats.mean_gap_ms = mean_us / 1000.0;
        self.stats.jitter_ms = jitter_us / 1000.0;

        let min = self.config.min_ms as f64;
        let max = self.config.max_ms as f64;
        let target = (min + JITTER_MULTIPLIER * self.stats.jitter_ms).clamp(min, max);
        self.target_depth_ms = target;
        self.stats.target_depth_ms = target;
    }

    fn enforce_overflow(&mut self) {
        let max_ms = self.config.max_ms as f64;
        while self.current_depth_ms() > max_ms {
            if let Some((&lowest_seq, _)) = self.frames.iter().next() {
                self.frames.remove(&lowest_seq);
                self.stats.overruns += 1;
            } else {
                break;
            }
        }
    }

    /// `true` once the buffer holds at least the current target depth.
    pub fn ready(&self) -> bool {
        self.current_depth_ms() >= self.target_depth_ms
    }

    /// Dequeue the lowest-sequence frame if the buffer is `ready`;
    /// otherwise returns `None` and records an underrun.
    pub fn dequeue(&mut self) -> Option<SequencedFrame> {
        if !self.ready() {
            self.stats.underruns += 1;
            return None;
        }
        let seq = *self.frames.keys().next()?;
        let frame = self.frames.remove(&seq);
        self.stats.current_depth_ms = self.current_depth_ms();
        frame
    }

    pub fn stats(&self) -> JitterBufferStats {
        let mut s = self.stats.clone();
        s.current_depth_ms = self.current_depth_ms();
        s.target_depth_ms = self.target_depth_ms;
        s
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AudioFormat, AudioFrame, FrameFlags};

    fn frame_20ms(seq: u64) -> SequencedFrame {
        SequencedFrame {
            frame: AudioFrame::new(vec![0u8; 640], AudioFormat::LinearWide16kHz),
            sequence: seq,
            timestamp_us: seq * 20_000,
            duration_samples: 320, // 320 samples @ 16kHz = 20ms
            flags: FrameFlags::default(),
        }
    }

    #[test]
    fn dequeues_in_sequence_order_across_reorder() {
        let mut jb = JitterBuffer::new(JitterConfig { min_ms: 20, max_ms: 200, target_ms: 20 });
        for seq in [0u64, 2, 1, 3] {
            jb.enqueue(frame_20ms(seq));
        }
        let mut out = Vec::new();
        while let Some(f) = jb.dequeue() {
            out.push(f.sequence);
        }
        assert_eq!(out, vec![0, 1, 2, 3]);
    }

    #[test]
    fn target_depth_always_within_bounds() {
        let jb = JitterBuffer::new(JitterConfig { min_ms: 20, max_ms: 200, target_ms: 60 });
        let stats = jb.stats();
        assert!(stats.target_depth_ms >= 20.0 && stats.target_depth_ms <= 200.0);
    }

    #[test]
    fn duplicate_enqueue_does_not_double_count_depth() {
        let mut jb = JitterBuffer::new(JitterConfig { min_ms: 20, max_ms: 200, target_ms: 20 });
        jb.enqueue(frame_20ms(0));
        let depth_before = jb.stats().current_depth_ms;
        jb.enqueue(frame_20ms(0));
        assert_eq!(jb.stats().current_depth_ms, depth_before);
        assert_eq!(jb.stats().duplicate, 1);
    }

    #[test]
    fn overflow_at_max_depth_evicts_exactly_one() {
        // 10 frames * 20ms = 200ms == max_ms; one more push should evict one.
        let mut jb = JitterBuffer::new(JitterConfig { min_ms: 20, max_ms: 200, target_ms: 20 });
        for seq in 0..10u64 {
            jb.enqueue(frame_20ms(seq));
        }
        assert_eq!(jb.len(), 10);

        jb.enqueue(frame_20ms(10));
        assert_eq!(jb.len(), 10, "one extra frame pushed in should evict exactly one");
        assert_eq!(jb.stats().overruns, 1);
        // The evicted frame must be the lowest sequence.
        assert!(!jb.frames.contains_key(&0));
    }

    #[test]
    fn not_ready_below_target_depth_records_underrun() {
        let mut jb = JitterBuffer::new(JitterConfig { min_ms: 20, max_ms: 200, target_ms: 100 });
        jb.enqueue(frame_20ms(0));
        assert!(jb.dequeue().is_none());
        assert_eq!(jb.stats().underruns, 1);
    }
}
