//! Narrow-band companded ↔ linear PCM 16-bit conversion and 2x up/down
//! resampling.
//!
//! ```text
//!  Carrier (8 kHz, 8-bit mu-law)         Upstream (16 kHz, 16-bit LE PCM)
//!  ───────────────── ─decode_narrow_to_wide─▶
//!  ◀──────────────── ─encode_wide_to_narrow──
//! ```
//!
//! The up/down-sampling step reuses the linear-interpolation resampler
//! style used for the 16↔24 kHz conversion in the upstream bridge, just
//! at a fixed 2x ratio.

use crate::error::PipelineError;

/// Companded silence: the all-ones byte.
pub const COMPANDED_SILENCE: u8 = 0xFF;

const BIAS: i16 = 0x84;
const CLIP: i16 = 32635;

/// mu-law decode table exponent shifts, MSB-first bit layout:
/// sign(1) | exponent(3) | mantissa(4)
fn mulaw_decode_sample(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0f;

    let mut sample = (((mantissa as i16) << 3) + BIAS) << (exponent as i16);
    sample -= BIAS;
    if sign != 0 {
        -sample
    } else {
        sample
    }
}

fn mulaw_encode_sample(pcm: i16) -> u8 {
    let sign: u8 = if pcm < 0 { 0x80 } else { 0x00 };
    let mut sample = if pcm < 0 { pcm.saturating_neg() } else { pcm };
    if sample > CLIP {
        sample = CLIP;
    }
    sample += BIAS;

    let mut exponent: i16 = 7;
    let mut mask: i16 = 0x4000;
    while exponent > 0 {
        if sample & mask != 0 {
            break;
        }
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = (sample >> (exponent + 3)) & 0x0f;
    let byte = sign | ((exponent as u8) << 4) | (mantissa as u8);
    !byte
}

/// Decode 8-bit mu-law companded mono audio at 8 kHz into 16-bit linear
/// PCM mono at 16 kHz (little-endian). Output length is always 4x the
/// input length. Empty input returns empty output.
pub fn decode_narrow_to_wide(input: &[u8]) -> Vec<u8> {
    if input.is_empty() {
        return Vec::new();
    }

    let narrow: Vec<i16> = input.iter().map(|&b| mulaw_decode_sample(b)).collect();
    let wide = upsample_linear(&narrow);

    let mut out = Vec::with_capacity(wide.len() * 2);
    for s in wide {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Encode 16-bit linear PCM mono at 16 kHz (little-endian) into 8-bit
/// mu-law companded mono at 8 kHz. `input.len()` must be a multiple of
/// 2. Output length is `input.len() / 4`. Empty input returns empty
/// output.
pub fn encode_wide_to_narrow(input: &[u8]) -> Result<Vec<u8>, PipelineError> {
    if input.is_empty() {
        return Ok(Vec::new());
    }
    if input.len() % 2 != 0 {
        return Err(PipelineError::InvalidFormat(format!(
            "encode_wide_to_narrow requires an even byte length, got {}",
            input.len()
        )));
    }

    let samples: Vec<i16> = input
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();

    // 16 kHz -> 8 kHz: keep every second sample.
    let decimated: Vec<i16> = samples.iter().step_by(2).copied().collect();

    Ok(decimated.iter().map(|&s| mulaw_encode_sample(s)).collect())
}

/// Linear-interpolation upsample by exactly 2x: each input sample `s[i]`
/// produces `s[i]` followed by the midpoint between `s[i]` and `s[i+1]`
/// (the last sample is simply duplicated).
fn upsample_linear(samples: &[i16]) -> Vec<i16> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(samples.len() * 2);
    for i in 0..samples.len() {
        out.push(samples[i]);
        let next = samples.get(i + 1).copied().unwrap_or(samples[i]);
        let mid = ((samples[i] as i32) + (next as i32)) / 2;
        out.push(clamp_i16(mid));
    }
    out
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
