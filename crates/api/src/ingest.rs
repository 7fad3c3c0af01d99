//! Per-message ingest pipeline.
//!
//! Each inbound frame runs, in order: size check, JSON parse, rate limit,
//! schema validation, sanitization, stamping, aggregator intake. Every
//! rejection is counted and the event is dropped; the connection stays open.

use chrono::Utc;
use gateway_core::{sanitize_event, Event, RejectionCode};
use serde_json::{json, Value};
use telemetry::names;
use tracing::{debug, error, warn};

use crate::rate_limit::Admission;
use crate::state::AppState;

/// A rate-limited client raises a security event on its first rejection and
/// then on every this-many rejections.
const RATE_LIMIT_REPORT_EVERY: u64 = 10;

/// Errors listed in a security event's details.
const REPORTED_ERRORS: usize = 5;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Accepted,
    Rejected {
        code: RejectionCode,
        errors: Vec<String>,
    },
}

impl MessageOutcome {
    fn rejected(code: RejectionCode, error: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            errors: vec![error.into()],
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Runs one text frame through the pipeline.
pub fn process_message(state: &AppState, client_id: &str, text: &str) -> MessageOutcome {
    let metrics = &state.metrics;
    let _timer = metrics.start_timer(names::MESSAGE_PROCESSING_MS);
    let received_at = Utc::now();
    metrics.increment(names::EVENTS_RECEIVED);

    let max_size = state.validator.config().max_event_size_bytes;
    if text.len() > max_size {
        metrics.increment(names::INVALID_EVENTS);
        metrics.security_event(
            names::SECURITY_OVERSIZED,
            client_id,
            json!({ "size": text.len(), "max": max_size }),
        );
        return MessageOutcome::rejected(
            RejectionCode::EventTooLarge,
            format!(
                "event size {} bytes exceeds maximum of {} bytes",
                text.len(),
                max_size
            ),
        );
    }

    let mut value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(client_id = %client_id, error = %e, "Invalid JSON");
            metrics.increment(names::INVALID_MESSAGES);
            return MessageOutcome::rejected(RejectionCode::InvalidFormat, "Invalid JSON format");
        }
    };

    match state.rate_limiter.check(client_id) {
        Admission::Admitted => {}
        Admission::InvalidClient => {
            metrics.increment(names::RATE_LIMITED);
            metrics.security_event(names::SECURITY_INVALID_CLIENT, client_id, json!({}));
            return MessageOutcome::rejected(RejectionCode::InvalidClient, "invalid client id");
        }
        rejected => {
            metrics.increment(names::RATE_LIMITED);
            let rejections = rejected.rejections();
            let window = match rejected {
                Admission::BurstExceeded { .. } => "burst",
                _ => "sustained",
            };

            if rejections == 1 || rejections % RATE_LIMIT_REPORT_EVERY == 0 {
                let usage = state.rate_limiter.usage(client_id);
                metrics.security_event(
                    names::SECURITY_RATE_LIMIT,
                    client_id,
                    json!({ "window": window, "rejections": rejections, "usage": usage }),
                );
            }

            debug!(client_id = %client_id, window, rejections, "Rate limited");
            return MessageOutcome::rejected(
                RejectionCode::RateLimited,
                format!("{} rate limit exceeded", window),
            );
        }
    }

    let outcome = state.validator.validate(&value);
    if !outcome.is_valid() {
        let errors = outcome.messages();
        warn!(client_id = %client_id, errors = ?errors, "Invalid event");
        metrics.increment(names::INVALID_EVENTS);
        metrics.security_event(
            names::SECURITY_INVALID_SCHEMA,
            client_id,
            json!({ "errors": errors.iter().take(REPORTED_ERRORS).collect::<Vec<_>>() }),
        );
        return MessageOutcome::Rejected {
            code: RejectionCode::SchemaViolation,
            errors,
        };
    }

    sanitize_event(&mut value, state.validator.config());

    let mut event = match Event::from_value(value) {
        Ok(event) => event,
        Err(e) => {
            error!(client_id = %client_id, error = %e, "Failed to build validated event");
            metrics.increment(names::PROCESSING_ERRORS);
            return MessageOutcome::rejected(RejectionCode::SchemaViolation, e.to_string());
        }
    };
    event.stamp(client_id, received_at);

    if !state.aggregator.add_event(event) {
        // Counted as dropped by the aggregator
        return MessageOutcome::rejected(RejectionCode::QueueFull, "event queue full");
    }

    metrics.increment(names::EVENTS_PROCESSED);
    MessageOutcome::Accepted
}

/// Runs a binary frame through the pipeline if it holds UTF-8 text.
pub fn process_binary(state: &AppState, client_id: &str, bytes: &[u8]) -> MessageOutcome {
    match std::str::from_utf8(bytes) {
        Ok(text) => process_message(state, client_id, text),
        Err(_) => {
            state.metrics.increment(names::EVENTS_RECEIVED);
            state.metrics.increment(names::INVALID_MESSAGES);
            warn!(client_id = %client_id, len = bytes.len(), "Binary frame is not UTF-8");
            MessageOutcome::rejected(
                RejectionCode::InvalidFormat,
                "binary frame is not valid UTF-8",
            )
        }
    }
}
