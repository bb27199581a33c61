//! Synthesizes short breathing-noise bursts to fill silence between
//! spoken segments, so pauses don't read as dead air.

use rand::Rng;

use crate::config::BreathingConfig;

/// Ceiling duration a burst can stretch to; `Sigh` extends past it on
/// purpose (a slow exhale reads as longer than a deep breath).
const MAX_DURATION_MS: u32 = 300;
/// Floor duration for the shortest, barely-audible burst.
const MIN_DURATION_MS: u32 = 100;
/// Word count past which a completed sentence counts as "long" for the
/// insertion policy.
const LONG_SENTENCE_WORDS: usize = 15;
/// Word count past which an upcoming sentence warrants a deeper breath.
const VERY_LONG_SENTENCE_WORDS: usize = 25;

/// Shape of a breathing burst, loosely modeled on human breath patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstKind {
    /// Short, shallow breath between clauses.
    Normal,
    /// Longer, deeper intake before a long utterance.
    Deep,
    /// Very short breath, barely audible.
    Quick,
    /// Slow exhale, e.g. after a long sentence.
    Sigh,
}

impl BurstKind {
    fn default_duration_ms(self) -> u32 {
        match self {
            BurstKind::Normal => 200,
            BurstKind::Deep => MAX_DURATION_MS,
            BurstKind::Quick => MIN_DURATION_MS,
            BurstKind::Sigh => (MAX_DURATION_MS as f32 * 1.5) as u32,
        }
    }

    /// Relative loudness multiplier, applied on top of the configured intensity.
    fn gain(self) -> f32 {
        match self {
            BurstKind::Normal => 1.0,
            BurstKind::Deep => 1.5,
            BurstKind::Quick => 0.7,
            BurstKind::Sigh => 1.2,
        }
    }

    /// A faint low-frequency tonal component layered under the noise,
    /// giving the burst some body instead of pure hiss.
    fn tone_hz(self) -> f32 {
        match self {
            BurstKind::Normal => 100.0,
            BurstKind::Deep => 50.0,
            BurstKind::Quick => 150.0,
            BurstKind::Sigh => 80.0,
        }
    }
}

pub struct BreathingGenerator {
    config: BreathingConfig,
}

impl BreathingGenerator {
    pub fn new(config: BreathingConfig) -> Self {
        Self { config }
    }

    /// Decide whether a breathing burst belongs at this point in the
    /// transcript, and which kind.
    ///
    /// - End of sentence, prior sentence longer than 25 words → `Deep`.
    /// - End of sentence, prior sentence longer than 15 words → `Normal`.
    /// - Entering a pause longer than the sentence-pause threshold,
    ///   even mid-sentence → `Normal`.
    /// - Otherwise, no insertion.
    pub fn should_insert(
        &self,
        sentence_word_count: usize,
        at_sentence_end: bool,
        at_long_pause: bool,
    ) -> (bool, Option<BurstKind>) {
        if !self.config.enabled {
            return (false, None);
        }
        if at_sentence_end && sentence_word_count > VERY_LONG_SENTENCE_WORDS {
            return (true, Some(BurstKind::Deep));
        }
        if at_sentence_end && sentence_word_count > LONG_SENTENCE_WORDS {
            return (true, Some(BurstKind::Normal));
        }
        if at_long_pause {
            return (true, Some(BurstKind::Normal));
        }
        (false, None)
    }

    /// Synthesize one burst of 16-bit LE linear PCM at 16 kHz.
    /// `duration_ms` overrides the kind's default length when given.
    pub fn generate(&self, kind: BurstKind, duration_ms: Option<u32>) -> Vec<u8> {
        let duration = duration_ms.unwrap_or_else(|| kind.default_duration_ms());
        synthesize(kind, self.config.intensity, duration)
    }
}

/// Trapezoidal amplitude envelope: linear ramp up over the first 20% of
/// the burst, sustain through 60%, linear ramp down over the last 20%.
fn envelope(t: f32) -> f32 {
    const ATTACK: f32 = 0.2;
    const RELEASE: f32 = 0.8;
    if t < ATTACK {
        t / ATTACK
    } else if t < RELEASE {
        1.0
    } else {
        ((1.0 - t) / (1.0 - RELEASE)).max(0.0)
    }
}

fn synthesize(kind: BurstKind, intensity: f32, duration_ms: u32) -> Vec<u8> {
    const SAMPLE_RATE_HZ: u32 = 16_000;
    let n = ((duration_ms as u64) * (SAMPLE_RATE_HZ as u64) / 1000) as usize;
    let mut out = Vec::with_capacity(n * 2);
    if n == 0 {
        return out;
    }

    let mut rng = rand::thread_rng();
    let peak_amplitude = (i16::MAX as f32) * intensity.clamp(0.0, 1.0) * kind.gain();
    let tone_hz = kind.tone_hz();

    for i in 0..n {
        let t = i as f32 / n as f32;
        let env = envelope(t);

        let noise: f32 = rng.gen_range(-1.0f32..=1.0);
        let time_s = i as f32 / SAMPLE_RATE_HZ as f32;
        let tone = (2.0 * std::f32::consts::PI * tone_hz * time_s).sin();

        let mixed = (noise * 0.7 + tone * 0.3) * env * peak_amplitude;
        let sample = mixed.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        out.extend_from_slice(&sample.to_le_bytes());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_never_inserts() {
        let gen = BreathingGenerator::new(BreathingConfig { enabled: false, intensity: 0.3 });
        assert_eq!(gen.should_insert(40, true, true), (false, None));
    }

    #[test]
    fn short_sentence_end_does_not_insert() {
        let gen = BreathingGenerator::new(BreathingConfig::default());
        assert_eq!(gen.should_insert(5, true, false), (false, None));
    }

    #[test]
    fn long_sentence_end_inserts_normal() {
        let gen = BreathingGenerator::new(BreathingConfig::default());
        assert_eq!(gen.should_insert(20, true, false), (true, Some(BurstKind::Normal)));
    }

    #[test]
    fn very_long_sentence_end_inserts_deep() {
        let gen = BreathingGenerator::new(BreathingConfig::default());
        assert_eq!(gen.should_insert(30, true, false), (true, Some(BurstKind::Deep)));
    }

    #[test]
    fn long_pause_inserts_normal_even_mid_sentence() {
        let gen = BreathingGenerator::new(BreathingConfig::default());
        assert_eq!(gen.should_insert(3, false, true), (true, Some(BurstKind::Normal)));
    }

    #[test]
    fn burst_length_matches_kind_default_duration() {
        let gen = BreathingGenerator::new(BreathingConfig::default());
        let burst = gen.generate(BurstKind::Deep, None);
        let expected_samples = (MAX_DURATION_MS as u64 * 16_000 / 1000) as usize;
        assert_eq!(burst.len() / 2, expected_samples);
    }

    #[test]
    fn explicit_duration_overrides_kind_default() {
        let gen = BreathingGenerator::new(BreathingConfig::default());
        let burst = gen.generate(BurstKind::Normal, Some(50));
        assert_eq!(burst.len() / 2, 50 * 16_000 / 1000);
    }

    #[test]
    fn zero_intensity_yields_silence() {
        let gen = BreathingGenerator::new(BreathingConfig { enabled: true, intensity: 0.0 });
        let burst = gen.generate(BurstKind::Normal, None);
        assert!(burst.iter().all(|&b| b == 0));
    }

    #[test]
    fn envelope_starts_and_ends_near_zero() {
        assert!(envelope(0.0) < 0.1);
        assert!(envelope(1.0) < 0.1);
        assert!(envelope(0.5) > 0.9);
    }
}
