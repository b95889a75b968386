//! # Call Audio
//!
//! Everything between the raw media stream and the wire format.
//!
//! ## Key Components:
//! - **codec**: μ-law companding between linear PCM and 8-bit telephony samples
//! - **tone**: sine tone synthesis straight into μ-law
//! - **session**: the per-call state machine that decides when tones are sent
//!
//! ## Audio Format:
//! - **Sample Rate**: 8kHz
//! - **Channels**: Mono
//! - **Encoding**: μ-law, one byte per sample, base64 on the wire

pub mod codec;
pub mod session;
pub mod tone;
