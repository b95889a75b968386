//! # Media Stream Wire Protocol
//!
//! JSON text frames exchanged with the telephony network over the duplex
//! WebSocket channel.
//!
//! ## Inbound (network → service):
//! - `{"event": "connected", ...}`
//! - `{"event": "start", "start": {"streamSid": "MZ...", ...}}`
//! - `{"event": "media", "media": {"payload": "<base64 μ-law>", ...}}`
//! - `{"event": "stop", ...}`
//! - any other `event` value is accepted and ignored
//!
//! ## Outbound (service → network):
//! - `{"event": "media", "streamSid": "MZ...", "media": {"payload": "<base64 μ-law>"}}`

use crate::error::SessionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// A frame received from the telephony network.
///
/// Fields not listed here (sequence numbers, timestamps, tracks) are ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundFrame {
    /// Transport-level handshake, sent once before `start`
    Connected,

    /// The call's media stream began
    Start { start: StreamStart },

    /// A chunk of caller audio
    Media { media: MediaPayload },

    /// The call's media stream ended
    Stop,

    /// Any event this service does not act on (dtmf, mark, ...)
    #[serde(other)]
    Unknown,
}

/// Metadata carried by a `start` frame.
#[derive(Debug, Deserialize)]
pub struct StreamStart {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,

    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
}

/// Base64-encoded μ-law audio, used in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub payload: String,
}

impl MediaPayload {
    /// Encode a companded frame for the wire.
    pub fn from_audio(audio: &[u8]) -> Self {
        Self {
            payload: STANDARD.encode(audio),
        }
    }

    /// Decode the payload back to μ-law bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.payload)
    }
}

/// A frame sent to the telephony network.
///
/// Mirrors the inbound envelope so the remote player recognizes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
}

impl OutboundFrame {
    /// Build an outbound audio frame for a stream.
    pub fn media(stream_sid: impl Into<String>, audio: &[u8]) -> Self {
        OutboundFrame::Media {
            stream_sid: stream_sid.into(),
            media: MediaPayload::from_audio(audio),
        }
    }

    pub fn stream_sid(&self) -> &str {
        match self {
            OutboundFrame::Media { stream_sid, .. } => stream_sid,
        }
    }

    /// Serialize to the JSON text sent over the WebSocket.
    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Encode(e.to_string()))
    }
}

/// Parse one inbound text frame.
///
/// Anything that is not a JSON object with a string `event` (or a known event
/// missing its required fields) is reported as a malformed frame.
pub fn parse_inbound(text: &str) -> Result<InboundFrame, SessionError> {
    serde_json::from_str(text).map_err(|e| SessionError::MalformedFrame(e.to_string()))
}
