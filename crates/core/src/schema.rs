//! Schema validation for inbound events.
//!
//! Validation runs against the raw JSON value before it becomes an
//! [`Event`](crate::events::Event). It never mutates the payload, performs no
//! I/O, and reports every problem it finds (up to a cap) rather than stopping
//! at the first one.

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::RangeInclusive;
use validator::Validate;

use crate::error::Result;
use crate::events::{is_valid_rank, EventKind, HandType, Suit};
use crate::limits::{
    MAX_ANTE, MAX_ARRAY_LENGTH, MAX_CHIPS, MAX_EVENT_SIZE_BYTES, MAX_GAME_ID_LEN, MAX_HAND_SIZE,
    MAX_ITEM_COST, MAX_KEY_LENGTH, MAX_MONEY, MAX_MULT, MAX_NESTING_DEPTH, MAX_NUMERIC_MAGNITUDE,
    MAX_OBJECT_PROPERTIES, MAX_ROUND, MAX_SHOP_ITEMS, MAX_STRING_LENGTH, MAX_TOP_LEVEL_FIELDS,
    MILLIS_TIMESTAMP_THRESHOLD, TIMESTAMP_TOLERANCE_SECS,
};

/// Errors beyond this count are not recorded for a single event.
const MAX_REPORTED_ERRORS: usize = 32;

/// Top-level fields a client may send.
const CLIENT_FIELDS: [&str; MAX_TOP_LEVEL_FIELDS] = ["type", "timestamp", "game_id", "data"];

/// Fields the server attaches itself.
const SERVER_FIELDS: [&str; 2] = ["client_id", "received_at"];

/// Validation and sanitization limits.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum serialized event size in bytes
    #[validate(range(min = 64, max = 1048576))]
    pub max_event_size_bytes: usize,
    /// Allowed clock distance from server time, in seconds
    #[validate(range(min = 1))]
    pub timestamp_tolerance_secs: u64,
    /// Maximum `game_id` length
    #[validate(range(min = 1, max = 256))]
    pub max_game_id_length: usize,
    /// Maximum properties per object inside `data`
    #[validate(range(min = 1))]
    pub max_object_properties: usize,
    /// Maximum array length inside `data`
    #[validate(range(min = 1))]
    pub max_array_length: usize,
    /// Maximum nesting depth of `data`
    #[validate(range(min = 1, max = 32))]
    pub max_depth: usize,
    /// Maximum object key length
    #[validate(range(min = 1))]
    pub max_key_length: usize,
    /// Strings are truncated to this many chars
    #[validate(range(min = 1))]
    pub max_string_length: usize,
    /// Numbers are clamped to +/- this magnitude
    #[validate(range(min = 1.0))]
    pub max_numeric_magnitude: f64,
    /// Most cards a `hand_played` event may list
    #[validate(range(min = 1, max = 52))]
    pub max_hand_size: usize,
    /// Enabled event kinds (a subset of the built-in allow-list)
    #[validate(length(min = 1))]
    pub allowed_event_types: Vec<EventKind>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_event_size_bytes: MAX_EVENT_SIZE_BYTES,
            timestamp_tolerance_secs: TIMESTAMP_TOLERANCE_SECS,
            max_game_id_length: MAX_GAME_ID_LEN,
            max_object_properties: MAX_OBJECT_PROPERTIES,
            max_array_length: MAX_ARRAY_LENGTH,
            max_depth: MAX_NESTING_DEPTH,
            max_key_length: MAX_KEY_LENGTH,
            max_string_length: MAX_STRING_LENGTH,
            max_numeric_magnitude: MAX_NUMERIC_MAGNITUDE,
            max_hand_size: MAX_HAND_SIZE,
            allowed_event_types: EventKind::ALL.to_vec(),
        }
    }
}

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Rejects the event.
    Error,
    /// Recorded only; the sanitizer corrects it.
    Warning,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationError {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of validating one event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationError>,
}

impl ValidationOutcome {
    /// True when no finding has [`Severity::Error`].
    pub fn is_valid(&self) -> bool {
        !self.errors.iter().any(|e| e.severity == Severity::Error)
    }

    /// Findings that reject the event.
    pub fn rejections(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(|e| e.severity == Severity::Error)
    }

    /// Messages of rejecting findings, for logs and acknowledgements.
    pub fn messages(&self) -> Vec<String> {
        self.rejections().map(|e| e.to_string()).collect()
    }

    fn push(&mut self, error: ValidationError) {
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(error);
        }
    }
}

/// Per-kind semantic check.
type SemanticRule = fn(&Map<String, Value>, &ValidationConfig, &mut ValidationOutcome);

/// Returns the semantic rule for an event kind.
///
/// Exhaustive: a new [`EventKind`] does not compile until it has a rule here.
fn semantic_rule(kind: EventKind) -> SemanticRule {
    match kind {
        EventKind::HandPlayed => check_hand_played,
        EventKind::ShopEntered => check_shop_entered,
        EventKind::CardPurchased => check_card_purchased,
        EventKind::JokerActivated => check_joker_activated,
        EventKind::GameOver | EventKind::RoundComplete | EventKind::AnteComplete => {
            check_progress
        }
        EventKind::GameStart
        | EventKind::Action
        | EventKind::StateUpdate
        | EventKind::Heartbeat => check_nothing,
    }
}

/// Validates raw event payloads.
#[derive(Debug, Clone)]
pub struct EventValidator {
    config: ValidationConfig,
    game_id_pattern: Regex,
}

impl EventValidator {
    /// Creates a validator, rejecting out-of-range configuration.
    pub fn new(config: ValidationConfig) -> Result<Self> {
        config.validate()?;
        let game_id_pattern = Regex::new(&format!(
            "^[A-Za-z0-9_-]{{1,{}}}$",
            config.max_game_id_length
        ))
        .map_err(|e| crate::Error::config(format!("game_id pattern: {}", e)))?;

        Ok(Self {
            config,
            game_id_pattern,
        })
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validates one event payload.
    pub fn validate(&self, value: &Value) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();

        let Value::Object(fields) = value else {
            outcome.push(ValidationError::error("event", "event must be a JSON object"));
            return outcome;
        };

        let size = serde_json::to_vec(value).map(|v| v.len()).unwrap_or(usize::MAX);
        if size > self.config.max_event_size_bytes {
            outcome.push(ValidationError::error(
                "event",
                format!(
                    "event size {} bytes exceeds maximum of {} bytes",
                    size, self.config.max_event_size_bytes
                ),
            ));
            return outcome;
        }

        for key in fields.keys() {
            if SERVER_FIELDS.contains(&key.as_str()) {
                outcome.push(ValidationError::error(
                    key.as_str(),
                    "field is reserved for server metadata",
                ));
            } else if !CLIENT_FIELDS.contains(&key.as_str()) {
                outcome.push(ValidationError::error(truncate_key(key), "unexpected field"));
            }
        }

        let kind = self.check_type(fields.get("type"), &mut outcome);

        let requires_data = kind.map(|k| k.requires_data()).unwrap_or(true);
        let missing: Vec<&str> = CLIENT_FIELDS
            .iter()
            .copied()
            .filter(|f| !fields.contains_key(*f))
            .filter(|f| *f != "data" || requires_data)
            .collect();
        if !missing.is_empty() {
            outcome.push(ValidationError::error(
                "required_fields",
                format!("missing required fields: {}", missing.join(", ")),
            ));
        }

        if let Some(ts) = fields.get("timestamp") {
            self.check_timestamp(ts, &mut outcome);
        }
        if let Some(game_id) = fields.get("game_id") {
            self.check_game_id(game_id, &mut outcome);
        }

        if let Some(data_value) = fields.get("data") {
            match data_value {
                Value::Object(data) => {
                    self.check_structure(data_value, "data", 1, &mut outcome);
                    if let Some(kind) = kind {
                        semantic_rule(kind)(data, &self.config, &mut outcome);
                    }
                }
                _ => outcome.push(ValidationError::error("data", "data must be an object")),
            }
        }

        outcome
    }

    fn check_type(
        &self,
        value: Option<&Value>,
        outcome: &mut ValidationOutcome,
    ) -> Option<EventKind> {
        let name = match value? {
            Value::String(name) => name,
            _ => {
                outcome.push(ValidationError::error("type", "type must be a string"));
                return None;
            }
        };

        let Ok(kind) = name.parse::<EventKind>() else {
            outcome.push(ValidationError::error(
                "type",
                format!("Invalid event type '{}'", truncate_key(name)),
            ));
            return None;
        };

        if !self.config.allowed_event_types.contains(&kind) {
            outcome.push(ValidationError::error(
                "type",
                format!("event type '{}' is not enabled", kind),
            ));
            return None;
        }

        Some(kind)
    }

    fn check_timestamp(&self, value: &Value, outcome: &mut ValidationOutcome) {
        let Some(ts) = value.as_f64() else {
            outcome.push(ValidationError::error("timestamp", "timestamp must be a number"));
            return;
        };

        if !ts.is_finite() || ts < 0.0 {
            outcome.push(ValidationError::error(
                "timestamp",
                "timestamp must be a non-negative number",
            ));
            return;
        }

        let secs = normalize_timestamp(ts);
        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        let tolerance = self.config.timestamp_tolerance_secs as f64;
        if (secs - now).abs() > tolerance {
            outcome.push(ValidationError::error(
                "timestamp",
                format!(
                    "timestamp is more than {}s away from server time",
                    self.config.timestamp_tolerance_secs
                ),
            ));
        }
    }

    fn check_game_id(&self, value: &Value, outcome: &mut ValidationOutcome) {
        let Some(game_id) = value.as_str() else {
            outcome.push(ValidationError::error("game_id", "game_id must be a string"));
            return;
        };

        if !self.game_id_pattern.is_match(game_id) {
            outcome.push(ValidationError::error(
                "game_id",
                format!(
                    "game_id must be 1-{} characters of [A-Za-z0-9_-]",
                    self.config.max_game_id_length
                ),
            ));
        }
    }

    /// Walks nested data enforcing size, depth, and key bounds.
    fn check_structure(
        &self,
        value: &Value,
        path: &str,
        depth: usize,
        outcome: &mut ValidationOutcome,
    ) {
        match value {
            Value::Object(map) => {
                if depth > self.config.max_depth {
                    outcome.push(ValidationError::error(
                        path,
                        format!("nesting depth exceeds maximum of {}", self.config.max_depth),
                    ));
                    return;
                }
                if map.len() > self.config.max_object_properties {
                    outcome.push(ValidationError::error(
                        path,
                        format!(
                            "object has {} properties, maximum is {}",
                            map.len(),
                            self.config.max_object_properties
                        ),
                    ));
                }
                for (key, child) in map {
                    if key.chars().count() > self.config.max_key_length {
                        outcome.push(ValidationError::error(
                            format!("{}.{}", path, truncate_key(key)),
                            format!("key exceeds maximum length of {}", self.config.max_key_length),
                        ));
                        continue;
                    }
                    self.check_structure(child, &format!("{}.{}", path, key), depth + 1, outcome);
                }
            }
            Value::Array(items) => {
                if depth > self.config.max_depth {
                    outcome.push(ValidationError::error(
                        path,
                        format!("nesting depth exceeds maximum of {}", self.config.max_depth),
                    ));
                    return;
                }
                if items.len() > self.config.max_array_length {
                    outcome.push(ValidationError::error(
                        path,
                        format!(
                            "array has {} elements, maximum is {}",
                            items.len(),
                            self.config.max_array_length
                        ),
                    ));
                }
                for (i, item) in items.iter().enumerate() {
                    self.check_structure(item, &format!("{}[{}]", path, i), depth + 1, outcome);
                }
            }
            Value::Number(n) => {
                if !n.as_f64().map(f64::is_finite).unwrap_or(false) {
                    outcome.push(ValidationError::error(path, "number must be finite"));
                }
            }
            Value::String(s) => {
                if s.chars().count() > self.config.max_string_length {
                    outcome.push(ValidationError::warning(
                        path,
                        format!(
                            "string will be truncated to {} characters",
                            self.config.max_string_length
                        ),
                    ));
                }
            }
            Value::Bool(_) | Value::Null => {}
        }
    }
}

/// Converts a millisecond timestamp to seconds; seconds pass through.
pub fn normalize_timestamp(ts: f64) -> f64 {
    if ts > MILLIS_TIMESTAMP_THRESHOLD {
        ts / 1000.0
    } else {
        ts
    }
}

/// Bounds attacker-controlled text before it lands in an error message.
fn truncate_key(key: &str) -> String {
    key.chars().take(MAX_KEY_LENGTH).collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Presence {
    Required,
    Optional,
}

/// Checks a numeric field against an inclusive range.
fn check_number(
    data: &Map<String, Value>,
    field: &str,
    range: RangeInclusive<f64>,
    presence: Presence,
    outcome: &mut ValidationOutcome,
) {
    let path = format!("data.{}", field);
    match data.get(field) {
        None if presence == Presence::Required => {
            outcome.push(ValidationError::error(path, "field is required"));
        }
        None => {}
        Some(value) => match value.as_f64() {
            Some(n) if range.contains(&n) => {}
            Some(n) if n < 0.0 && *range.start() >= 0.0 => {
                outcome.push(ValidationError::error(path, "must be non-negative"));
            }
            Some(_) => outcome.push(ValidationError::error(
                path,
                format!("must be between {} and {}", range.start(), range.end()),
            )),
            None => outcome.push(ValidationError::error(path, "must be a number")),
        },
    }
}

/// Checks an integer field against an inclusive range.
fn check_integer(
    data: &Map<String, Value>,
    field: &str,
    range: RangeInclusive<i64>,
    presence: Presence,
    outcome: &mut ValidationOutcome,
) {
    let path = format!("data.{}", field);
    match data.get(field) {
        None if presence == Presence::Required => {
            outcome.push(ValidationError::error(path, "field is required"));
        }
        None => {}
        Some(value) => match value.as_i64() {
            Some(n) if range.contains(&n) => {}
            Some(_) => outcome.push(ValidationError::error(
                path,
                format!("must be between {} and {}", range.start(), range.end()),
            )),
            None => outcome.push(ValidationError::error(path, "must be an integer")),
        },
    }
}

fn check_nothing(_: &Map<String, Value>, _: &ValidationConfig, _: &mut ValidationOutcome) {}

fn check_hand_played(
    data: &Map<String, Value>,
    config: &ValidationConfig,
    outcome: &mut ValidationOutcome,
) {
    match data.get("hand_type") {
        None => outcome.push(ValidationError::error("data.hand_type", "field is required")),
        Some(Value::String(name)) if HandType::parse(name).is_some() => {}
        Some(_) => outcome.push(ValidationError::error("data.hand_type", "unknown hand type")),
    }

    match data.get("cards_played") {
        None => outcome.push(ValidationError::error("data.cards_played", "field is required")),
        Some(Value::Array(cards)) => {
            if cards.is_empty() {
                outcome.push(ValidationError::error(
                    "data.cards_played",
                    "at least one card must be played",
                ));
            } else if cards.len() > config.max_hand_size {
                outcome.push(ValidationError::error(
                    "data.cards_played",
                    format!(
                        "too many cards played: {} exceeds maximum hand size of {}",
                        cards.len(),
                        config.max_hand_size
                    ),
                ));
            }
            for (i, card) in cards.iter().enumerate().take(config.max_hand_size) {
                check_card(card, i, outcome);
            }
        }
        Some(_) => outcome.push(ValidationError::error("data.cards_played", "must be an array")),
    }

    check_number(data, "chips", 0.0..=MAX_CHIPS, Presence::Optional, outcome);
    check_number(data, "mult", 0.0..=MAX_MULT, Presence::Optional, outcome);
}

fn check_card(card: &Value, index: usize, outcome: &mut ValidationOutcome) {
    let path = format!("data.cards_played[{}]", index);
    match card {
        Value::Object(fields) => {
            let rank_ok = fields.get("rank").and_then(Value::as_str).is_some_and(is_valid_rank);
            if !rank_ok {
                outcome.push(ValidationError::error(format!("{}.rank", path), "invalid card rank"));
            }
            let suit_ok = fields
                .get("suit")
                .and_then(Value::as_str)
                .and_then(Suit::parse)
                .is_some();
            if !suit_ok {
                outcome.push(ValidationError::error(format!("{}.suit", path), "invalid card suit"));
            }
        }
        Value::String(code) => {
            if !is_valid_card_code(code) {
                outcome.push(ValidationError::error(path, "invalid card code"));
            }
        }
        _ => outcome.push(ValidationError::error(
            path,
            "card must be a {rank, suit} object or card code",
        )),
    }
}

/// Short codes: a rank followed by a suit initial, such as `AH` or `10S`.
fn is_valid_card_code(code: &str) -> bool {
    let mut chars = code.chars();
    match chars.next_back() {
        Some(initial) => Suit::from_initial(initial).is_some() && is_valid_rank(chars.as_str()),
        None => false,
    }
}

fn check_shop_entered(
    data: &Map<String, Value>,
    _: &ValidationConfig,
    outcome: &mut ValidationOutcome,
) {
    check_integer(data, "ante", 1..=MAX_ANTE, Presence::Required, outcome);
    check_integer(data, "round", 1..=MAX_ROUND, Presence::Required, outcome);
    check_number(data, "money", 0.0..=MAX_MONEY, Presence::Required, outcome);

    match data.get("shop_items") {
        None => {}
        Some(Value::Array(items)) => {
            if items.len() > MAX_SHOP_ITEMS {
                outcome.push(ValidationError::error(
                    "data.shop_items",
                    format!("shop offers {} items, maximum is {}", items.len(), MAX_SHOP_ITEMS),
                ));
            }
            for (i, item) in items.iter().enumerate().take(MAX_SHOP_ITEMS) {
                match item {
                    Value::Object(fields) => {
                        let mut scoped = ValidationOutcome::default();
                        let cost = 0.0..=MAX_ITEM_COST;
                        check_number(fields, "cost", cost, Presence::Required, &mut scoped);
                        let prefix = format!("data.shop_items[{}].", i);
                        for mut err in scoped.errors {
                            err.field = err.field.replacen("data.", &prefix, 1);
                            outcome.push(err);
                        }
                    }
                    _ => outcome.push(ValidationError::error(
                        format!("data.shop_items[{}]", i),
                        "shop item must be an object",
                    )),
                }
            }
        }
        Some(_) => outcome.push(ValidationError::error("data.shop_items", "must be an array")),
    }
}

fn check_card_purchased(
    data: &Map<String, Value>,
    _: &ValidationConfig,
    outcome: &mut ValidationOutcome,
) {
    check_number(data, "cost", 0.0..=MAX_ITEM_COST, Presence::Required, outcome);
}

fn check_joker_activated(
    data: &Map<String, Value>,
    _: &ValidationConfig,
    outcome: &mut ValidationOutcome,
) {
    check_number(data, "chips", 0.0..=MAX_CHIPS, Presence::Optional, outcome);
    check_number(data, "mult", 0.0..=MAX_MULT, Presence::Optional, outcome);
}

fn check_progress(
    data: &Map<String, Value>,
    _: &ValidationConfig,
    outcome: &mut ValidationOutcome,
) {
    check_integer(data, "ante", 1..=MAX_ANTE, Presence::Optional, outcome);
    check_integer(data, "round", 1..=MAX_ROUND, Presence::Optional, outcome);
    check_number(data, "final_score", 0.0..=f64::MAX, Presence::Optional, outcome);
}
