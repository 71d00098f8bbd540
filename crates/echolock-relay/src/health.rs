//! Per-relay circuit breaker. A relay that fails repeatedly is skipped for
//! a cooldown window rather than retried on every publish/query, so a
//! single dead relay doesn't add its full timeout to every operation.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{DEFAULT_CIRCUIT_BREAKER_THRESHOLD, DEFAULT_COOLDOWN_SECS};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayHealth {
    pub last_success: Option<u64>,
    pub last_failure: Option<u64>,
    pub consecutive_failures: u32,
    pub cooldown_until: Option<u64>,
}

impl RelayHealth {
    pub fn is_backing_off(&self, now: u64) -> bool {
        matches!(self.cooldown_until, Some(until) if now < until)
    }
}

/// Tracks health for a pool of relay URLs and decides which are eligible
/// for the next publish/query round.
pub struct RelayHealthTracker {
    health: HashMap<String, RelayHealth>,
    threshold: u32,
    cooldown_secs: u64,
}

impl Default for RelayHealthTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CIRCUIT_BREAKER_THRESHOLD, DEFAULT_COOLDOWN_SECS)
    }
}

impl RelayHealthTracker {
    pub fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            health: HashMap::new(),
            threshold,
            cooldown_secs,
        }
    }

    pub fn record_success(&mut self, relay: &str) {
        let entry = self.health.entry(relay.to_string()).or_default();
        entry.last_success = Some(now());
        entry.consecutive_failures = 0;
        entry.cooldown_until = None;
    }

    pub fn record_failure(&mut self, relay: &str) {
        let now_ts = now();
        let entry = self.health.entry(relay.to_string()).or_default();
        entry.last_failure = Some(now_ts);
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= self.threshold {
            entry.cooldown_until = Some(now_ts + self.cooldown_secs);
        }
    }

    /// Relays not currently in cooldown. A relay with no history is
    /// always eligible.
    pub fn eligible<'a>(&self, relays: &'a [String]) -> Vec<&'a String> {
        let now_ts = now();
        relays
            .iter()
            .filter(|r| {
                self.health
                    .get(r.as_str())
                    .map(|h| !h.is_backing_off(now_ts))
                    .unwrap_or(true)
            })
            .collect()
    }

    pub fn health_of(&self, relay: &str) -> RelayHealth {
        self.health.get(relay).cloned().unwrap_or_default()
    }

    /// Relays eligible for a recovery probe: currently backing off but
    /// whose cooldown has elapsed.
    pub fn due_for_recovery_probe<'a>(&self, relays: &'a [String]) -> Vec<&'a String> {
        let now_ts = now();
        relays
            .iter()
            .filter(|r| {
                self.health
                    .get(r.as_str())
                    .map(|h| h.cooldown_until.map(|u| now_ts >= u).unwrap_or(false))
                    .unwrap_or(false)
            })
            .collect()
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
