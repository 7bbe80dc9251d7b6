//! JSON Output for sync activity
//!
//! Renders outbound requests, model events and transcript errors as one JSON
//! object per line so a replay can be diffed or piped into other tools.

use crate::observer::ModelEvent;
use crate::scheduler::Request;
use crate::status::PrinterStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp as f64 seconds since UNIX epoch with consistent precision
pub fn current_timestamp() -> f64 {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();

    // Round to 6 decimal places for consistent formatting
    (timestamp * 1_000_000.0).round() / 1_000_000.0
}

/// A request handed to the serial link
#[derive(Debug, Clone, Serialize)]
pub struct RequestEvent {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Engine clock in milliseconds when the request was sent
    pub at_ms: u64,
    pub request: String,
}

/// A model notification with a timestamp attached
#[derive(Debug, Clone, Serialize)]
pub struct ModelEventRecord {
    pub timestamp: f64,
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: ModelEvent,
}

/// A transcript line that could not be used
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub error: String,
}

/// Totals for a finished replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub started_at: String,
    pub finished_at: String,
    pub lines: usize,
    pub requests: usize,
    pub errors: usize,
    pub status: PrinterStatus,
}

impl ReplaySummary {
    pub fn new(
        started_at: DateTime<Utc>,
        lines: usize,
        requests: usize,
        errors: usize,
        status: PrinterStatus,
    ) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "summary".to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            lines,
            requests,
            errors,
            status,
        }
    }
}

impl RequestEvent {
    pub fn new(request: &Request, at_ms: u64) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "request".to_string(),
            at_ms,
            request: request.to_string(),
        }
    }
}

impl ModelEventRecord {
    pub fn new(event: ModelEvent, at_ms: u64) -> Self {
        Self {
            timestamp: current_timestamp(),
            at_ms,
            event,
        }
    }
}

impl ErrorEvent {
    pub fn new(error: &str, line: Option<usize>) -> Self {
        Self {
            timestamp: current_timestamp(),
            event_type: "error".to_string(),
            line,
            error: error.to_string(),
        }
    }
}

/// Output a JSON event to stdout
pub fn output_event<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{}", json);
    }
}

/// Convenience functions for outputting specific event types
pub mod output {
    use super::*;

    /// Output a request sent to the controller
    pub fn request_sent(request: &Request, at_ms: u64) {
        output_event(&RequestEvent::new(request, at_ms));
    }

    /// Output a model change
    pub fn model_event(event: ModelEvent, at_ms: u64) {
        output_event(&ModelEventRecord::new(event, at_ms));
    }

    /// Output a transcript error
    pub fn transcript_error(line: usize, error: &str) {
        output_event(&ErrorEvent::new(error, Some(line)));
    }

    /// Output replay totals
    pub fn summary(summary: ReplaySummary) {
        output_event(&summary);
    }
}
