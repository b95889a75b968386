//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform variables: `HOST`, `PORT`, `STREAM_URL`
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_TONES__HEARTBEAT_INTERVAL_MS`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys use a double underscore so field names that contain an
//! underscore (`stream_url`, `duration_ms`) survive the mapping.

use crate::audio::session::SessionSettings;
use crate::audio::tone::{ToneSpec, SAMPLE_RATE_HZ};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub tones: TonesConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "0.0.0.0"`: Accept connections from any address (the telephony network must reach us)
/// - `port = 8080`: Usually fronted by a TLS-terminating proxy that serves `wss://`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// How the telephony network reaches the media stream endpoint.
///
/// ## Fields:
/// - `stream_url`: Public `wss://` address of `/media-stream`. It is handed to
///   the network verbatim in the `/voice` call directive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    pub stream_url: String,
}

/// Tone generation settings used by every call session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TonesConfig {
    pub sample_rate_hz: u32,
    pub greeting: ToneSpec,
    pub heartbeat: ToneSpec,
    /// Minimum time between heartbeat tones, in milliseconds
    pub heartbeat_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            telephony: TelephonyConfig {
                stream_url: "wss://localhost:8080/media-stream".to_string(),
            },
            tones: TonesConfig {
                sample_rate_hz: SAMPLE_RATE_HZ,
                greeting: ToneSpec::GREETING,
                heartbeat: ToneSpec::HEARTBEAT,
                heartbeat_interval_ms: 6000,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_TONES__GREETING__FREQUENCY_HZ=440`: Lower the greeting pitch
    /// - `PORT=3000`: Special case for deployment platforms
    /// - `STREAM_URL=wss://calls.example.com/media-stream`: Public stream endpoint
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(stream_url) = env::var("STREAM_URL") {
            settings = settings.set_override("telephony.stream_url", stream_url)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Stream URL is a WebSocket URL
    /// - Tones are audible and representable at the configured sample rate
    /// - Heartbeat interval is positive
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        let url = self.telephony.stream_url.trim();
        if !(url.starts_with("wss://") || url.starts_with("ws://")) {
            return Err(anyhow::anyhow!(
                "Stream URL must start with wss:// or ws://, got '{}'",
                self.telephony.stream_url
            ));
        }

        if self.tones.sample_rate_hz == 0 {
            return Err(anyhow::anyhow!("Sample rate must be greater than 0"));
        }

        for (name, tone) in [("greeting", &self.tones.greeting), ("heartbeat", &self.tones.heartbeat)] {
            if tone.duration_ms == 0 {
                return Err(anyhow::anyhow!("The {} tone duration must be greater than 0", name));
            }
            if tone.frequency_hz == 0 || tone.frequency_hz >= self.tones.sample_rate_hz / 2 {
                return Err(anyhow::anyhow!(
                    "The {} tone frequency must be between 1 and {} Hz, got {}",
                    name,
                    (self.tones.sample_rate_hz / 2).saturating_sub(1),
                    tone.frequency_hz
                ));
            }
        }

        if self.tones.heartbeat_interval_ms == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than 0"));
        }

        Ok(())
    }
}

impl TonesConfig {
    /// Per-call settings derived from this configuration.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            sample_rate_hz: self.sample_rate_hz,
            greeting: self.greeting,
            heartbeat: self.heartbeat,
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tones.sample_rate_hz, 8000);
        assert_eq!(config.tones.greeting, ToneSpec { duration_ms: 300, frequency_hz: 880 });
        assert_eq!(config.tones.heartbeat, ToneSpec { duration_ms: 200, frequency_hz: 660 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.telephony.stream_url = "https://example.com/media-stream".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.tones.heartbeat.frequency_hz = 4000; // Nyquist at 8 kHz
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.tones.greeting.duration_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.tones.heartbeat_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_settings_from_tones() {
        let settings = AppConfig::default().tones.session_settings();
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(6));
        assert_eq!(settings, SessionSettings::default());
    }
}
