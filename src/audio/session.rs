//! # Call Session State Machine
//!
//! Drives one phone call's media stream from the first frame to the last.
//! The state machine is independent of the transport: it is fed one inbound
//! text frame at a time together with the current instant, and answers with
//! the action the connection should take.
//!
//! ## Session Lifecycle:
//! 1. **AwaitingStart**: Channel accepted, no stream id yet
//! 2. **Active**: `start` received, greeting sent, heartbeat timer running
//! 3. **Terminated**: `stop` received, or the channel closed or failed
//!
//! ## Transitions:
//! | State | Event | Action | Next |
//! |---|---|---|---|
//! | AwaitingStart | connected | none | AwaitingStart |
//! | AwaitingStart | start | send greeting, heartbeat clock = now | Active |
//! | Active | media | send heartbeat if interval elapsed | Active |
//! | AwaitingStart/Active | stop | close | Terminated |
//! | any | unknown event | none | unchanged |
//!
//! ## Ownership:
//! A `CallSession` is owned by exactly one connection and mutated only by it,
//! so it carries no locks. The heartbeat clock is a plain field, not shared state.

use crate::audio::codec;
use crate::audio::tone::{ToneSpec, SAMPLE_RATE_HZ};
use crate::error::SessionError;
use crate::protocol::{self, InboundFrame, MediaPayload, OutboundFrame, StreamStart};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Current status of a call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// Channel open, waiting for the `start` frame
    AwaitingStart,
    /// Stream id known, audio flowing
    Active,
    /// Session over; no further frames are processed
    Terminated,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::AwaitingStart => "awaiting_start",
            CallStatus::Active => "active",
            CallStatus::Terminated => "terminated",
        }
    }
}

/// What the connection should do after a frame has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Nothing to send
    None,
    /// Send this frame to the remote party
    Send(OutboundFrame),
    /// End the session and release the channel
    Close,
}

/// Tone and timing settings shared by every session of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub sample_rate_hz: u32,
    pub greeting: ToneSpec,
    pub heartbeat: ToneSpec,
    /// A heartbeat is due once strictly more than this has passed
    pub heartbeat_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            greeting: ToneSpec::GREETING,
            heartbeat: ToneSpec::HEARTBEAT,
            heartbeat_interval: Duration::from_secs(6),
        }
    }
}

/// Counters kept for the end-of-call log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_received: u64,
    pub media_frames_received: u64,
    pub audio_bytes_received: u64,
    /// Loudest inbound linear sample magnitude seen so far
    pub inbound_peak: i16,
    pub frames_sent: u64,
    pub heartbeats_sent: u64,
    pub malformed_frames: u64,
}

/// One phone call's media stream.
pub struct CallSession {
    status: CallStatus,
    stream_sid: Option<String>,
    call_sid: Option<String>,
    last_heartbeat: Option<Instant>,
    settings: SessionSettings,
    stats: SessionStats,
}

impl CallSession {
    /// Create a session for a freshly accepted channel.
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            status: CallStatus::AwaitingStart,
            stream_sid: None,
            call_sid: None,
            last_heartbeat: None,
            settings,
            stats: SessionStats::default(),
        }
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    /// Stream id assigned by the network, once `start` has arrived.
    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call_sid.as_deref()
    }

    /// When the greeting or the most recent heartbeat was sent.
    pub fn last_heartbeat(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn is_terminated(&self) -> bool {
        self.status == CallStatus::Terminated
    }

    /// Handle one inbound text frame received at `now`.
    ///
    /// ## Returns:
    /// - **Ok(action)**: what the connection should do next
    /// - **Err(MalformedFrame)**: the frame was skipped; the session continues
    pub fn handle_text(&mut self, text: &str, now: Instant) -> Result<SessionAction, SessionError> {
        if self.is_terminated() {
            return Ok(SessionAction::None);
        }

        self.stats.frames_received += 1;

        match protocol::parse_inbound(text) {
            Ok(frame) => Ok(self.handle_frame(frame, now)),
            Err(err) => {
                self.stats.malformed_frames += 1;
                Err(err)
            }
        }
    }

    /// Apply one parsed frame to the state machine.
    pub fn handle_frame(&mut self, frame: InboundFrame, now: Instant) -> SessionAction {
        match (self.status, frame) {
            (CallStatus::Terminated, _) => SessionAction::None,

            (_, InboundFrame::Stop) => {
                info!(
                    stream_sid = self.stream_sid.as_deref().unwrap_or("-"),
                    "Call stopped by remote party"
                );
                self.terminate();
                SessionAction::Close
            }

            (_, InboundFrame::Connected) => {
                debug!("Media stream transport connected");
                SessionAction::None
            }

            (CallStatus::AwaitingStart, InboundFrame::Start { start }) => self.start(start, now),

            (CallStatus::Active, InboundFrame::Start { start }) => {
                warn!(
                    stream_sid = self.stream_sid.as_deref().unwrap_or("-"),
                    ignored_stream_sid = %start.stream_sid,
                    "Duplicate start frame ignored"
                );
                SessionAction::None
            }

            (CallStatus::Active, InboundFrame::Media { media }) => self.media(&media, now),

            (CallStatus::AwaitingStart, InboundFrame::Media { .. }) => {
                debug!("Media frame before start ignored");
                SessionAction::None
            }

            (_, InboundFrame::Unknown) => {
                debug!(status = self.status.as_str(), "Unrecognized event ignored");
                SessionAction::None
            }
        }
    }

    /// Mark the session finished. Later frames are ignored.
    pub fn terminate(&mut self) {
        self.status = CallStatus::Terminated;
    }

    fn start(&mut self, start: StreamStart, now: Instant) -> SessionAction {
        info!(
            stream_sid = %start.stream_sid,
            call_sid = start.call_sid.as_deref().unwrap_or("-"),
            "Call media stream started"
        );

        self.stream_sid = Some(start.stream_sid);
        self.call_sid = start.call_sid;
        self.status = CallStatus::Active;
        self.last_heartbeat = Some(now);

        let greeting = self.settings.greeting;
        self.send_tone(greeting)
    }

    fn media(&mut self, media: &MediaPayload, now: Instant) -> SessionAction {
        self.stats.media_frames_received += 1;
        match media.decode() {
            Ok(audio) => {
                self.stats.audio_bytes_received += audio.len() as u64;
                let peak = codec::expand_all(&audio)
                    .into_iter()
                    .map(|sample| sample.saturating_abs())
                    .max()
                    .unwrap_or(0);
                self.stats.inbound_peak = self.stats.inbound_peak.max(peak);
            }
            Err(err) => debug!(error = %err, "Inbound media payload is not valid base64"),
        }

        if !self.heartbeat_due(now) {
            return SessionAction::None;
        }

        self.last_heartbeat = Some(now);
        self.stats.heartbeats_sent += 1;

        let heartbeat = self.settings.heartbeat;
        self.send_tone(heartbeat)
    }

    /// Whether strictly more than the heartbeat interval has passed.
    fn heartbeat_due(&self, now: Instant) -> bool {
        match self.last_heartbeat {
            Some(last) => now.saturating_duration_since(last) > self.settings.heartbeat_interval,
            None => false,
        }
    }

    fn send_tone(&mut self, tone: ToneSpec) -> SessionAction {
        let Some(stream_sid) = self.stream_sid.as_deref() else {
            return SessionAction::None;
        };

        let audio = tone.render(self.settings.sample_rate_hz);
        debug!(
            stream_sid = %stream_sid,
            frequency_hz = tone.frequency_hz,
            duration_ms = tone.duration_ms,
            bytes = audio.len(),
            "Sending tone"
        );

        self.stats.frames_sent += 1;
        SessionAction::Send(OutboundFrame::media(stream_sid, &audio))
    }
}
