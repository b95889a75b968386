//! # μ-law Companding
//!
//! Converts between linear 16-bit PCM and the 8-bit logarithmic μ-law encoding
//! carried on telephony media streams.
//!
//! ## Encoding Steps (per sample):
//! 1. **Sign**: remember whether the sample is negative (bit 7 of the code)
//! 2. **Clamp**: magnitude is limited to [`SAMPLE_CEILING`] (never an error)
//! 3. **Bias**: add [`BIAS`] so every magnitude has a set bit in the segment window
//! 4. **Segment**: position of the highest set bit picks the 3-bit exponent
//! 5. **Mantissa**: the 4 bits just below the leading bit
//! 6. **Complement**: the assembled byte is inverted before transmission
//!
//! All functions are pure: no shared state, safe to call from any number of
//! sessions at once.

/// Largest sample magnitude the encoder represents. Larger magnitudes are clamped.
pub const SAMPLE_CEILING: i32 = 8191;

/// Bias added to the clamped magnitude before the segment search.
pub const BIAS: i32 = 33;

const SIGN_BIT: u8 = 0x80;
const MANTISSA_MASK: u32 = 0x0F;
const MAX_SEGMENT: u32 = 7;

/// Bit index that maps to segment 0. Bit 6 is segment 1, bit 12 is segment 7.
const SEGMENT_BASE_BIT: u32 = 5;

/// Compress a buffer of linear samples into μ-law bytes.
///
/// The output always has exactly one byte per input sample.
pub fn compress(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&sample| compress_sample(sample)).collect()
}

/// Compress a single linear sample into its complemented μ-law byte.
pub fn compress_sample(sample: i16) -> u8 {
    let sample = sample as i32;
    let sign = if sample < 0 { SIGN_BIT } else { 0 };

    // i32 so that i16::MIN has a representable magnitude
    let biased = (sample.abs().min(SAMPLE_CEILING) + BIAS) as u32;

    let exponent = segment(biased);
    let mantissa = (biased >> (exponent + 3)) & MANTISSA_MASK;

    !(sign | ((exponent as u8) << 4) | mantissa as u8)
}

/// Expand a μ-law byte back to a linear sample.
///
/// Returns the midpoint of the byte's quantization interval with the bias
/// removed, so `expand(compress_sample(x))` is close to `x` for |x| ≤ 8191.
pub fn expand(code: u8) -> i16 {
    let code = !code;
    let negative = code & SIGN_BIT != 0;
    let exponent = ((code >> 4) & 0x07) as u32;
    let mantissa = (code as u32) & MANTISSA_MASK;

    let shift = exponent + 3;
    let biased = (mantissa << shift) + (1 << (shift - 1));
    let magnitude = (biased as i32 - BIAS).max(0) as i16;

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Expand a buffer of μ-law bytes into linear samples.
pub fn expand_all(codes: &[u8]) -> Vec<i16> {
    codes.iter().map(|&code| expand(code)).collect()
}

/// Segment (exponent) of a biased magnitude.
///
/// Equivalent to scanning a descending bitmask from bit 12 down to bit 6,
/// computed from the leading-zero count. Magnitudes with a leading bit above
/// bit 12 (only the clamped ceiling plus bias) stay in the top segment.
fn segment(biased: u32) -> u32 {
    let top_bit = u32::BITS - 1 - biased.leading_zeros();
    top_bit.saturating_sub(SEGMENT_BASE_BIT).min(MAX_SEGMENT)
}
