//! Test fixtures and event generators.

use chrono::Utc;
use serde_json::{json, Value};

fn now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// A valid heartbeat for the given game.
pub fn heartbeat(game_id: &str) -> Value {
    json!({
        "type": "heartbeat",
        "timestamp": now(),
        "game_id": game_id
    })
}

/// A `hand_played` event listing `cards` aces of spades.
pub fn hand_played(game_id: &str, cards: usize) -> Value {
    let cards_played: Vec<Value> = (0..cards)
        .map(|_| json!({ "rank": "A", "suit": "Spades" }))
        .collect();

    json!({
        "type": "hand_played",
        "timestamp": now(),
        "game_id": game_id,
        "data": {
            "hand_type": "Pair",
            "cards_played": cards_played,
            "chips": 32,
            "mult": 2
        }
    })
}

/// A `game_start` event with a numbered seed.
pub fn game_start(game_id: &str, seed: usize) -> Value {
    json!({
        "type": "game_start",
        "timestamp": now(),
        "game_id": game_id,
        "data": { "seed": format!("SEED{}", seed) }
    })
}

/// An event whose encoded form is larger than `max_bytes`.
pub fn oversized(max_bytes: usize) -> Value {
    let mut event = heartbeat("g-big");
    event["data"] = json!({ "padding": "x".repeat(max_bytes) });
    event
}

/// An event of a type the gateway does not know.
pub fn unknown_type() -> Value {
    json!({
        "type": "cheat_engaged",
        "timestamp": now(),
        "game_id": "g1"
    })
}
