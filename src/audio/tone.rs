//! # Tone Synthesis
//!
//! Generates pure sine tones directly in the μ-law wire format. These tones
//! stand in for synthesized speech: a greeting when the call's media stream
//! starts and a short heartbeat to prove the outbound audio path still works.

use crate::audio::codec;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Telephony sample rate (narrowband, mono).
pub const SAMPLE_RATE_HZ: u32 = 8000;

/// Peak amplitude: 20% of full scale, leaving headroom on carrier lines.
const AMPLITUDE: f64 = 0.2 * i16::MAX as f64;

/// Duration and pitch of one synthesized tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneSpec {
    pub duration_ms: u32,
    pub frequency_hz: u32,
}

impl ToneSpec {
    /// Played once when the media stream starts.
    pub const GREETING: ToneSpec = ToneSpec {
        duration_ms: 300,
        frequency_hz: 880,
    };

    /// Played whenever the heartbeat interval has elapsed.
    pub const HEARTBEAT: ToneSpec = ToneSpec {
        duration_ms: 200,
        frequency_hz: 660,
    };

    /// Render this tone as a companded frame.
    pub fn render(&self, sample_rate_hz: u32) -> Vec<u8> {
        synthesize_tone(self.duration_ms, self.frequency_hz, sample_rate_hz)
    }
}

/// Number of samples in `duration_ms` of audio, rounded to the nearest sample.
pub fn sample_count(duration_ms: u32, sample_rate_hz: u32) -> usize {
    (sample_rate_hz as f64 * duration_ms as f64 / 1000.0).round() as usize
}

/// Generate linear samples of a sine wave.
pub fn synthesize_samples(duration_ms: u32, frequency_hz: u32, sample_rate_hz: u32) -> Vec<i16> {
    let count = sample_count(duration_ms, sample_rate_hz);
    let step = TAU * frequency_hz as f64 / sample_rate_hz as f64;

    (0..count)
        .map(|n| (AMPLITUDE * (step * n as f64).sin()) as i16)
        .collect()
}

/// Generate a sine tone and compress it to μ-law.
///
/// ## Parameters:
/// - **duration_ms**: length of the tone
/// - **frequency_hz**: pitch of the tone
/// - **sample_rate_hz**: output sample rate, normally [`SAMPLE_RATE_HZ`]
///
/// ## Returns:
/// One μ-law byte per sample. The output is fully determined by the inputs.
pub fn synthesize_tone(duration_ms: u32, frequency_hz: u32, sample_rate_hz: u32) -> Vec<u8> {
    codec::compress(&synthesize_samples(duration_ms, frequency_hz, sample_rate_hz))
}
