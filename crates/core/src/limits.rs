//! Size and rate limits for the gateway.
//!
//! MEMORY SAFETY: the client is semi-trusted game tooling. Every bound here
//! caps how much memory a single message can claim once it is accepted.
//!
//! These are the defaults behind [`ValidationConfig`](crate::schema::ValidationConfig)
//! and the rate-limit/aggregator sections. The `#[validate]` derive needs
//! literal values, so config range rules repeat some numbers. Keep both in sync.

// === Message Limits ===

/// Maximum serialized event size in bytes (10KB).
///
/// Oversized events are rejected, never truncated.
pub const MAX_EVENT_SIZE_BYTES: usize = 10 * 1024;

/// Maximum number of top-level fields a client may send.
pub const MAX_TOP_LEVEL_FIELDS: usize = 4;

/// Maximum `game_id` length (chars).
pub const MAX_GAME_ID_LEN: usize = 100;

// === Nested Data Limits ===

/// Maximum properties in any object inside `data`.
pub const MAX_OBJECT_PROPERTIES: usize = 50;

/// Maximum elements in any array inside `data`.
pub const MAX_ARRAY_LENGTH: usize = 100;

/// Maximum nesting depth of `data` (the `data` object itself is depth 1).
pub const MAX_NESTING_DEPTH: usize = 5;

/// Maximum object key length (chars).
pub const MAX_KEY_LENGTH: usize = 50;

/// Strings longer than this are truncated by the sanitizer.
pub const MAX_STRING_LENGTH: usize = 1000;

/// Numbers are clamped to `[-MAX_NUMERIC_MAGNITUDE, MAX_NUMERIC_MAGNITUDE]`.
pub const MAX_NUMERIC_MAGNITUDE: f64 = 1e9;

// === Timestamp Bounds ===

/// Allowed distance between an event timestamp and server time, either way.
pub const TIMESTAMP_TOLERANCE_SECS: u64 = 3600;

/// Timestamps above this are read as milliseconds rather than seconds.
pub const MILLIS_TIMESTAMP_THRESHOLD: f64 = 1e11;

// === Game Rules ===

/// Most cards a single hand may play.
pub const MAX_HAND_SIZE: usize = 8;

/// Most items a shop can offer.
pub const MAX_SHOP_ITEMS: usize = 10;

/// Upper bound on chips scored by one hand.
pub const MAX_CHIPS: f64 = 1e9;

/// Upper bound on a hand multiplier.
pub const MAX_MULT: f64 = 1e6;

/// Upper bound on money held.
pub const MAX_MONEY: f64 = 1e6;

/// Upper bound on a single shop item cost.
pub const MAX_ITEM_COST: f64 = 1e4;

/// Highest ante a run can reach.
pub const MAX_ANTE: i64 = 100;

/// Rounds per ante.
pub const MAX_ROUND: i64 = 10;

// === Rate Limits ===

/// Admissions per client per burst window.
pub const DEFAULT_BURST_LIMIT: u32 = 30;

/// Burst window length in milliseconds.
pub const DEFAULT_BURST_WINDOW_MS: u64 = 1000;

/// Admissions per client per sustained window.
pub const DEFAULT_SUSTAINED_LIMIT: u32 = 600;

/// Sustained window length in milliseconds.
pub const DEFAULT_SUSTAINED_WINDOW_MS: u64 = 60_000;

/// Maximum client identity length.
pub const MAX_CLIENT_ID_LEN: usize = 64;
