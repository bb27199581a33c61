//! Derives natural pause durations from punctuation in upstream
//! transcripts and synthesizes the silence to insert between chunks.

use rand::Rng;

use crate::config::PauseConfig;

const PAUSE_FLOOR_MS: u32 = 50;
/// Jitter applied to each computed pause, as a fraction of its duration.
const JITTER_FRACTION: f32 = 0.20;

/// One detected pause point within a transcript, with its position
/// (byte offset) and computed duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PausePoint {
    pub byte_offset: usize,
    pub duration_ms: u32,
}

pub struct PauseManager {
    config: PauseConfig,
    /// Words-per-minute used to scale punctuation durations; faster
    /// speech compresses pauses proportionally.
    speech_rate_wpm: f32,
}

impl PauseManager {
    pub fn new(config: PauseConfig) -> Self {
        Self { config, speech_rate_wpm: 150.0 }
    }

    pub fn set_speech_rate_wpm(&mut self, wpm: f32) {
        self.speech_rate_wpm = wpm.max(1.0);
    }

    /// Scan `text` for punctuation with a configured duration and for
    /// sentence boundaries (`. ` / `? ` / `! ` followed by a capital
    /// letter or end of string), returning one [`PausePoint`] per hit in
    /// byte order. Returns an empty `Vec` if pauses are disabled.
    pub fn analyze(&self, text: &str) -> Vec<PausePoint> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut points = Vec::new();
        let chars: Vec<(usize, char)> = text.char_indices().collect();

        for (i, &(offset, ch)) in chars.iter().enumerate() {
            if let Some(&base_ms) = self.config.durations.get(&ch) {
                let is_sentence_end = matches!(ch, '.' | '?' | '!')
                    && chars.get(i + 1).map(|&(_, c)| c.is_whitespace()).unwrap_or(true);

                let duration_ms = if is_sentence_end {
                    base_ms + self.config.sentence_boundary_ms
                } else {
                    base_ms
                };

                points.push(PausePoint {
                    byte_offset: offset,
                    duration_ms: self.generate_pause(duration_ms),
                });
            }
        }

        points
    }

    /// Scale a base punctuation duration by speech rate and apply
    /// random jitter, floored at [`PAUSE_FLOOR_MS`].
    pub fn generate_pause(&self, base_ms: u32) -> u32 {
        const REFERENCE_WPM: f32 = 150.0;
        let rate_scale = REFERENCE_WPM / self.speech_rate_wpm;

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-JITTER_FRACTION..=JITTER_FRACTION);

        let scaled = base_ms as f32 * rate_scale * (1.0 + jitter);
        (scaled.round() as u32).max(PAUSE_FLOOR_MS)
    }

    /// Splice silence buffers into `chunks` (16-bit LE linear PCM at 16
    /// kHz) at the analyzed pause points, assuming `chunks[i]` maps 1:1
    /// to the i-th "word" boundary in `pauses`. Pauses beyond the chunk
    /// count are ignored.
    pub fn insert_pauses(&self, chunks: Vec<Vec<u8>>, pauses: &[PausePoint]) -> Vec<Vec<u8>> {
        const SAMPLE_RATE_HZ: u32 = 16_000;
        let mut out = Vec::with_capacity(chunks.len() + pauses.len());

        for (i, chunk) in chunks.into_iter().enumerate() {
            out.push(chunk);
            if let Some(p) = pauses.get(i) {
                out.push(silence_buffer(p.duration_ms, SAMPLE_RATE_HZ));
            }
        }

        out
    }
}

fn silence_buffer(duration_ms: u32, sample_rate_hz: u32) -> Vec<u8> {
    let n = ((duration_ms as u64) * (sample_rate_hz as u64) / 1000) as usize;
    vec![0u8; n * 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_analyzes_nothing() {
        let pm = PauseManager::new(PauseConfig { enabled: false, ..PauseConfig::default() });
        assert!(pm.analyze("Hello, world.").is_empty());
    }

    #[test]
    fn comma_and_period_are_both_detected() {
        let pm = PauseManager::new(PauseConfig::default());
        let points = pm.analyze("Hello, world.");
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn sentence_end_adds_boundary_bonus() {
        let pm = PauseManager::new(PauseConfig::default());
        let points = pm.analyze("Done.");
        // '.' base (500) + sentence_boundary_ms (400) = 900, then
        // rate-scaled and jittered +-20%; must stay above the comma-only case.
        let comma_points = pm.analyze("Wait,");
        assert!(points[0].duration_ms > comma_points[0].duration_ms);
    }

    #[test]
    fn generated_pause_never_below_floor() {
        let pm = PauseManager::new(PauseConfig::default());
        for _ in 0..50 {
            assert!(pm.generate_pause(1) >= PAUSE_FLOOR_MS);
        }
    }

    #[test]
    fn faster_speech_rate_shortens_pauses() {
        let mut pm = PauseManager::new(PauseConfig::default());
        pm.set_speech_rate_wpm(150.0);
        let baseline: u32 = (0..20).map(|_| pm.generate_pause(500)).sum::<u32>() / 20;

        pm.set_speech_rate_wpm(300.0);
        let faster: u32 = (0..20).map(|_| pm.generate_pause(500)).sum::<u32>() / 20;

        assert!(faster < baseline);
    }

    #[test]
    fn insert_pauses_splices_silence_between_chunks() {
        let pm = PauseManager::new(PauseConfig::default());
        let chunks = vec![vec![1u8; 10], vec![2u8; 10]];
        let pauses = vec![PausePoint { byte_offset: 0, duration_ms: 20 }];
        let spliced = pm.insert_pauses(chunks, &pauses);
        assert_eq!(spliced.len(), 3);
        assert_eq!(spliced[1].len(), (20 * 16_000 / 1000) * 2);
    }
}
