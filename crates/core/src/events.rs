//! Event type definitions for the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Supported telemetry event kinds.
///
/// This is the allow-list: anything that does not parse into one of these
/// variants is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    GameStart,
    HandPlayed,
    ShopEntered,
    CardPurchased,
    GameOver,
    Action,
    StateUpdate,
    JokerActivated,
    RoundComplete,
    AnteComplete,
    Heartbeat,
}

impl EventKind {
    /// Every supported kind.
    pub const ALL: [EventKind; 11] = [
        Self::GameStart,
        Self::HandPlayed,
        Self::ShopEntered,
        Self::CardPurchased,
        Self::GameOver,
        Self::Action,
        Self::StateUpdate,
        Self::JokerActivated,
        Self::RoundComplete,
        Self::AnteComplete,
        Self::Heartbeat,
    ];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GameStart => "game_start",
            Self::HandPlayed => "hand_played",
            Self::ShopEntered => "shop_entered",
            Self::CardPurchased => "card_purchased",
            Self::GameOver => "game_over",
            Self::Action => "action",
            Self::StateUpdate => "state_update",
            Self::JokerActivated => "joker_activated",
            Self::RoundComplete => "round_complete",
            Self::AnteComplete => "ante_complete",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Whether the kind must carry a `data` object.
    ///
    /// Heartbeats are bare system pings.
    pub fn requires_data(&self) -> bool {
        !matches!(self, Self::Heartbeat)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidEventType(s.to_string()))
    }
}

/// Poker hands a `hand_played` event may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandType {
    HighCard,
    Pair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    FlushHouse,
    FlushFive,
    FiveOfAKind,
}

impl HandType {
    const NAMES: [(&'static str, HandType); 12] = [
        ("high card", Self::HighCard),
        ("pair", Self::Pair),
        ("two pair", Self::TwoPair),
        ("three of a kind", Self::ThreeOfAKind),
        ("straight", Self::Straight),
        ("flush", Self::Flush),
        ("full house", Self::FullHouse),
        ("four of a kind", Self::FourOfAKind),
        ("straight flush", Self::StraightFlush),
        ("flush house", Self::FlushHouse),
        ("flush five", Self::FlushFive),
        ("five of a kind", Self::FiveOfAKind),
    ];

    /// Parses a hand name, ignoring case and `_` vs space.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('_', " ");
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == normalized)
            .map(|(_, hand)| *hand)
    }
}

/// Card suits, including the wildcard enhancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
    Wild,
}

impl Suit {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Hearts" => Some(Self::Hearts),
            "Diamonds" => Some(Self::Diamonds),
            "Clubs" => Some(Self::Clubs),
            "Spades" => Some(Self::Spades),
            "Wild" => Some(Self::Wild),
            _ => None,
        }
    }

    /// Suit from the trailing letter of a card code such as `AH` or `10S`.
    pub fn from_initial(initial: char) -> Option<Self> {
        match initial {
            'H' => Some(Self::Hearts),
            'D' => Some(Self::Diamonds),
            'C' => Some(Self::Clubs),
            'S' => Some(Self::Spades),
            'W' => Some(Self::Wild),
            _ => None,
        }
    }
}

/// Returns true for `A`, `2`-`9`, `10`, `T`, `J`, `Q`, `K`.
pub fn is_valid_rank(rank: &str) -> bool {
    matches!(
        rank,
        "A" | "2" | "3" | "4" | "5" | "6" | "7" | "8" | "9" | "10" | "T" | "J" | "Q" | "K"
    )
}

/// A validated, sanitized telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Client timestamp (seconds or milliseconds since epoch)
    pub timestamp: f64,
    /// Game identifier
    pub game_id: String,
    /// Free-form payload, bounded by the validator
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    /// Connection identity, set by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Server receive time, set by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn new(kind: EventKind, game_id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            kind,
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            game_id: game_id.into(),
            data,
            client_id: None,
            received_at: None,
        }
    }

    /// Converts a validated payload into a typed event.
    ///
    /// Call only after [`EventValidator::validate`](crate::schema::EventValidator::validate)
    /// has accepted the value.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Attaches server-side metadata.
    pub fn stamp(&mut self, client_id: impl Into<String>, received_at: DateTime<Utc>) {
        self.client_id = Some(client_id.into());
        self.received_at = Some(received_at);
    }
}
