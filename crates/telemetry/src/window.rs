//! Time-bucketed counts for windowed rates.
//!
//! Each increment of a tracked counter is also added to a per-interval
//! bucket, so health checks can ask "how many in the last N seconds" rather
//! than "how many since startup".

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

/// Buckets kept per window.
const BUCKETS_PER_WINDOW: i64 = 60;

#[derive(Debug)]
struct Bucket {
    index: i64,
    counts: HashMap<String, u64>,
}

/// Counts bucketed by wall-clock interval, covering a fixed span.
#[derive(Debug)]
pub struct RollingCounts {
    bucket_secs: i64,
    span_buckets: i64,
    buckets: VecDeque<Bucket>,
}

impl RollingCounts {
    pub fn new(span_secs: u64) -> Self {
        let span = span_secs.max(1) as i64;
        let bucket_secs = (span / BUCKETS_PER_WINDOW).max(1);
        Self {
            bucket_secs,
            span_buckets: span.div_euclid(bucket_secs) + 1,
            buckets: VecDeque::new(),
        }
    }

    fn index(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.bucket_secs)
    }

    /// Adds `n` to `name` in the bucket covering `at`.
    pub fn record_at(&mut self, name: &str, n: u64, at: DateTime<Utc>) {
        let index = self.index(at);
        let newest = self.buckets.back().map_or(index, |b| b.index.max(index));
        if index <= newest - self.span_buckets {
            return;
        }

        // Buckets stay sorted by index; late records land in their own slot.
        let pos = self.buckets.partition_point(|b| b.index < index);
        match self.buckets.get_mut(pos) {
            Some(bucket) if bucket.index == index => {
                *bucket.counts.entry(name.to_string()).or_default() += n;
            }
            _ => {
                let mut counts = HashMap::new();
                counts.insert(name.to_string(), n);
                self.buckets.insert(pos, Bucket { index, counts });
            }
        }

        while self
            .buckets
            .front()
            .is_some_and(|b| b.index <= newest - self.span_buckets)
        {
            self.buckets.pop_front();
        }
    }

    /// Sum of `name` over the buckets at or after `since`.
    pub fn sum_since(&self, name: &str, since: DateTime<Utc>) -> u64 {
        let first = self.index(since);
        self.buckets
            .iter()
            .rev()
            .take_while(|b| b.index >= first)
            .filter_map(|b| b.counts.get(name))
            .sum()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
