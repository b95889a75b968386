//! # Application State Management
//!
//! State shared by every HTTP worker and every call connection.
//!
//! ## What lives here:
//! - **Configuration**: read by each new connection to build its session settings
//! - **Metrics**: HTTP request counters and call counters for `/api/v1/metrics`
//! - **Start time**: for uptime reporting
//!
//! ## What does NOT live here:
//! Per-call state (stream id, heartbeat clock) belongs to the one connection
//! that owns the call. Calls never read or write each other's state; the
//! counters below are observability only.
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: every worker holds a reference to the same data
//! - **RwLock**: many readers or one writer at a time
//!
//! A poisoned lock only means another thread panicked mid-update of a counter,
//! so the guard is recovered rather than propagating the panic.

use crate::config::AppConfig;
use crate::error::SessionError;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration, fixed after startup validation
    pub config: Arc<RwLock<AppConfig>>,

    /// Counters updated by middleware and call connections
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests and calls.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of HTTP requests that ended in an error status
    pub error_count: u64,

    /// Per-endpoint statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,

    /// Call media streams currently connected
    pub active_calls: u32,

    /// Call media streams accepted since server start
    pub total_calls: u64,

    /// Inbound protocol frames across all calls
    pub frames_received: u64,

    /// Outbound audio frames across all calls
    pub frames_sent: u64,

    /// Inbound frames that could not be parsed and were skipped
    pub malformed_frames: u64,

    /// Sessions that ended because of an unexpected failure
    pub sessions_failed: u64,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the lock immediately so no caller holds it across an await.
    pub fn get_config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    /// Increment the total error counter (4xx and 5xx responses).
    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    /// Record duration and outcome of one request to `endpoint`.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// A call's media stream connected.
    pub fn call_opened(&self) {
        let mut metrics = self.metrics_write();
        metrics.active_calls += 1;
        metrics.total_calls += 1;
    }

    /// A call's media stream went away, for whatever reason.
    pub fn call_closed(&self) {
        let mut metrics = self.metrics_write();
        metrics.active_calls = metrics.active_calls.saturating_sub(1);
    }

    pub fn record_frame_received(&self) {
        self.metrics_write().frames_received += 1;
    }

    pub fn record_frame_sent(&self) {
        self.metrics_write().frames_sent += 1;
    }

    /// Count a session-level error by its classification.
    pub fn record_session_error(&self, error: &SessionError) {
        let mut metrics = self.metrics_write();
        match error {
            SessionError::MalformedFrame(_) => metrics.malformed_frames += 1,
            SessionError::Disconnected => {}
            SessionError::Transport(_) | SessionError::Encode(_) => metrics.sessions_failed += 1,
        }
    }

    /// Get a snapshot of current metrics (used for the metrics endpoints).
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_counters() {
        let state = AppState::new(AppConfig::default());
        state.call_opened();
        state.call_opened();
        state.call_closed();
        state.call_closed();
        state.call_closed(); // never underflows

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_calls, 0);
        assert_eq!(metrics.total_calls, 2);
    }

    #[test]
    fn test_session_errors_are_classified() {
        let state = AppState::new(AppConfig::default());
        state.record_session_error(&SessionError::MalformedFrame("x".to_string()));
        state.record_session_error(&SessionError::Disconnected);
        state.record_session_error(&SessionError::Transport("reset".to_string()));

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.malformed_frames, 1);
        assert_eq!(metrics.sessions_failed, 1);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let metrics = state.get_metrics_snapshot();
        let health = &metrics.endpoint_metrics["GET /health"];
        assert_eq!(health.request_count, 2);
        assert_eq!(health.average_duration_ms(), 20.0);
        assert_eq!(health.error_rate(), 0.5);
    }
}
