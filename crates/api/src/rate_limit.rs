//! Per-client admission control.
//!
//! Two sliding windows per client: a short burst window and a one-minute
//! sustained window. An event is admitted only when both have room, and
//! admission records the instant in both.

use gateway_core::limits::{
    DEFAULT_BURST_LIMIT, DEFAULT_BURST_WINDOW_MS, DEFAULT_SUSTAINED_LIMIT,
    DEFAULT_SUSTAINED_WINDOW_MS, MAX_CLIENT_ID_LEN,
};
use gateway_core::{Error, Result};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use validator::Validate;

const SHARDS: usize = 16;

/// Rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateLimitConfig {
    /// Admissions allowed per burst window
    #[serde(default = "default_burst_limit")]
    #[validate(range(min = 1))]
    pub burst_limit: u32,
    #[serde(default = "default_burst_window_ms")]
    #[validate(range(min = 1))]
    pub burst_window_ms: u64,
    /// Admissions allowed per sustained window
    #[serde(default = "default_sustained_limit")]
    #[validate(range(min = 1))]
    pub sustained_limit: u32,
    #[serde(default = "default_sustained_window_ms")]
    #[validate(range(min = 1))]
    pub sustained_window_ms: u64,
    /// How often idle clients are reaped
    #[serde(default = "default_cleanup_interval_secs")]
    #[validate(range(min = 1))]
    pub cleanup_interval_secs: u64,
}

fn default_burst_limit() -> u32 {
    DEFAULT_BURST_LIMIT
}

fn default_burst_window_ms() -> u64 {
    DEFAULT_BURST_WINDOW_MS
}

fn default_sustained_limit() -> u32 {
    DEFAULT_SUSTAINED_LIMIT
}

fn default_sustained_window_ms() -> u64 {
    DEFAULT_SUSTAINED_WINDOW_MS
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst_limit: default_burst_limit(),
            burst_window_ms: default_burst_window_ms(),
            sustained_limit: default_sustained_limit(),
            sustained_window_ms: default_sustained_window_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    fn burst_window(&self) -> Duration {
        Duration::from_millis(self.burst_window_ms)
    }

    fn sustained_window(&self) -> Duration {
        Duration::from_millis(self.sustained_window_ms)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Burst window full; carries the client's total rejections
    BurstExceeded { rejections: u64 },
    /// Sustained window full; carries the client's total rejections
    SustainedExceeded { rejections: u64 },
    /// Client identity failed validation; no state was created
    InvalidClient,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    pub fn rejections(&self) -> u64 {
        match self {
            Self::BurstExceeded { rejections } | Self::SustainedExceeded { rejections } => {
                *rejections
            }
            _ => 0,
        }
    }
}

/// Current window usage of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUsage {
    pub burst: usize,
    pub sustained: usize,
    pub rejections: u64,
}

/// Usage of one client, as listed in the metrics dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReport {
    pub client_id: String,
    #[serde(flatten)]
    pub usage: ClientUsage,
}

#[derive(Debug)]
struct ClientRateState {
    burst: VecDeque<Instant>,
    sustained: VecDeque<Instant>,
    rejections: u64,
    last_seen: Instant,
}

impl ClientRateState {
    fn new(now: Instant) -> Self {
        Self {
            burst: VecDeque::new(),
            sustained: VecDeque::new(),
            rejections: 0,
            last_seen: now,
        }
    }

    fn prune(&mut self, now: Instant, burst: Duration, sustained: Duration) {
        prune_window(&mut self.burst, now, burst);
        prune_window(&mut self.sustained, now, sustained);
    }

    fn usage(&mut self, now: Instant, config: &RateLimitConfig) -> ClientUsage {
        self.prune(now, config.burst_window(), config.sustained_window());
        ClientUsage {
            burst: self.burst.len(),
            sustained: self.sustained.len(),
            rejections: self.rejections,
        }
    }
}

fn prune_window(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(oldest) = window.front() {
        if now.saturating_duration_since(*oldest) >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Sliding-window limiter keyed by validated client identity.
pub struct ClientRateLimiter {
    config: RateLimitConfig,
    client_pattern: Regex,
    shards: Box<[Mutex<HashMap<String, ClientRateState>>]>,
}

impl ClientRateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        let pattern = format!(r"^[A-Za-z0-9_.:\-\[\]]{{1,{}}}$", MAX_CLIENT_ID_LEN);
        let client_pattern = Regex::new(&pattern)
            .map_err(|e| Error::config(format!("invalid client id pattern: {}", e)))?;

        Ok(Self {
            config,
            client_pattern,
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn shard(&self, client_id: &str) -> &Mutex<HashMap<String, ClientRateState>> {
        let mut hasher = DefaultHasher::new();
        client_id.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % self.shards.len()]
    }

    /// Whether `client_id` is acceptable as a map key.
    pub fn is_valid_client_id(&self, client_id: &str) -> bool {
        self.client_pattern.is_match(client_id)
    }

    /// Boolean form of [`check`](Self::check).
    pub fn admit(&self, client_id: &str) -> bool {
        self.check(client_id).is_admitted()
    }

    pub fn check(&self, client_id: &str) -> Admission {
        self.check_at(client_id, Instant::now())
    }

    /// Checks and records an admission as of `now`.
    pub fn check_at(&self, client_id: &str, now: Instant) -> Admission {
        if !self.is_valid_client_id(client_id) {
            return Admission::InvalidClient;
        }

        let mut clients = self.shard(client_id).lock();
        let state = clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientRateState::new(now));

        state.last_seen = now;
        state.prune(now, self.config.burst_window(), self.config.sustained_window());

        if state.burst.len() >= self.config.burst_limit as usize {
            state.rejections += 1;
            return Admission::BurstExceeded {
                rejections: state.rejections,
            };
        }

        if state.sustained.len() >= self.config.sustained_limit as usize {
            state.rejections += 1;
            return Admission::SustainedExceeded {
                rejections: state.rejections,
            };
        }

        state.burst.push_back(now);
        state.sustained.push_back(now);
        Admission::Admitted
    }

    /// Window usage for a client, if it has state.
    pub fn usage(&self, client_id: &str) -> Option<ClientUsage> {
        self.usage_at(client_id, Instant::now())
    }

    pub fn usage_at(&self, client_id: &str, now: Instant) -> Option<ClientUsage> {
        let mut clients = self.shard(client_id).lock();
        let state = clients.get_mut(client_id)?;
        Some(state.usage(now, &self.config))
    }

    /// The `limit` busiest clients by sustained-window admissions, then by
    /// rejections.
    pub fn top_clients(&self, limit: usize) -> Vec<ClientReport> {
        self.top_clients_at(limit, Instant::now())
    }

    pub fn top_clients_at(&self, limit: usize, now: Instant) -> Vec<ClientReport> {
        let mut reports: Vec<ClientReport> = Vec::new();
        for shard in self.shards.iter() {
            let mut clients = shard.lock();
            reports.extend(clients.iter_mut().map(|(client_id, state)| ClientReport {
                client_id: client_id.clone(),
                usage: state.usage(now, &self.config),
            }));
        }

        reports.sort_by(|a, b| {
            b.usage
                .sustained
                .cmp(&a.usage.sustained)
                .then(b.usage.rejections.cmp(&a.usage.rejections))
                .then_with(|| a.client_id.cmp(&b.client_id))
        });
        reports.truncate(limit);
        reports
    }

    /// Clients currently holding state.
    pub fn client_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Removes clients idle for a full sustained window. Returns how many.
    pub fn cleanup_stale(&self) -> usize {
        self.cleanup_stale_at(Instant::now())
    }

    pub fn cleanup_stale_at(&self, now: Instant) -> usize {
        let idle = self.config.sustained_window();
        let mut removed = 0;

        for shard in self.shards.iter() {
            let mut clients = shard.lock();
            let before = clients.len();
            clients.retain(|_, state| now.saturating_duration_since(state.last_seen) < idle);
            removed += before - clients.len();
        }

        removed
    }
}

/// Shared rate limiter state.
pub type SharedRateLimiter = Arc<ClientRateLimiter>;
