//! Metric names shared across the gateway crates.

// Connection manager
pub const EVENTS_RECEIVED: &str = "events_received_total";
pub const EVENTS_PROCESSED: &str = "events_processed_total";
pub const INVALID_MESSAGES: &str = "invalid_messages_total";
pub const INVALID_EVENTS: &str = "invalid_events_total";
pub const RATE_LIMITED: &str = "rate_limited_total";
pub const PROCESSING_ERRORS: &str = "processing_errors_total";
pub const WEBSOCKET_CONNECTIONS: &str = "websocket_connections";
pub const CONNECTIONS_OPENED: &str = "connections_opened_total";
pub const MESSAGE_PROCESSING_MS: &str = "message_processing_ms";
pub const RATE_LIMITED_CLIENTS: &str = "rate_limiter_clients";

// Aggregator
pub const EVENTS_DROPPED: &str = "events_dropped_total";
pub const QUEUE_DEPTH: &str = "queue_depth";
pub const BATCHES_DISPATCHED: &str = "batches_dispatched_total";
pub const BATCH_SIZE: &str = "batch_size";
pub const BATCH_PROCESSING_MS: &str = "batch_processing_ms";
pub const SLOW_BATCHES: &str = "slow_batches_total";
pub const DELIVERY_MS: &str = "delivery_ms";
pub const DELIVERIES: &str = "deliveries_total";
pub const DELIVERY_ERRORS: &str = "delivery_errors_total";
pub const BATCHED_EVENTS: &str = "batched_events_total";

// Security event types
pub const SECURITY_INVALID_SCHEMA: &str = "invalid_schema";
pub const SECURITY_OVERSIZED: &str = "oversized_event";
pub const SECURITY_RATE_LIMIT: &str = "rate_limit_exceeded";
pub const SECURITY_INVALID_CLIENT: &str = "invalid_client_id";

/// Counters also kept in time buckets for the health verdict.
pub const RATE_TRACKED: [&str; 7] = [
    EVENTS_RECEIVED,
    EVENTS_PROCESSED,
    INVALID_MESSAGES,
    INVALID_EVENTS,
    PROCESSING_ERRORS,
    DELIVERIES,
    DELIVERY_ERRORS,
];
