//! Quota Ledger (C3).
//!
//! A mapping from (provider, model, period) to an atomic counter, reset daily. Grounded on the
//! counter/reset *shape* of `src/safety/rate_limiter.rs` (`HashMap` keyed by a string, guarded by
//! a lock, `reset()`), generalised per
//! `original_source/backend/app/core/quota_manager.py`'s key scheme (`quota:{provider}:{model}:
//! {period}`) and its warn-at-80%/exhausted-at-100% thresholds. Unlike the rate limiter (a
//! token-bucket admission gate), this is a plain incrementing counter with a status query — the
//! ledger never itself refuses a call; the Router decides what to do with `status()`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::QuotaPeriod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    provider: String,
    model: String,
    period: QuotaPeriod,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QuotaStatusEntry {
    pub provider: String,
    pub model: String,
    pub period: QuotaPeriod,
    pub used: u64,
    pub limit: u64,
    pub pct: f32,
}

struct Inner {
    counters: HashMap<Key, (u64, u64)>, // (used, limit)
    last_reset_date: NaiveDate,
}

/// Warn threshold from `quota_manager.py`: usage at or above 80% of limit.
pub const WARN_THRESHOLD_PCT: f32 = 80.0;

pub struct QuotaLedger {
    inner: Mutex<Inner>,
}

impl QuotaLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                counters: HashMap::new(),
                last_reset_date: Utc::now().date_naive(),
            }),
        }
    }

    fn key(provider: &str, model: &str, period: QuotaPeriod) -> Key {
        Key { provider: provider.to_string(), model: model.to_string(), period }
    }

    /// Atomic increment of a (provider, model, period) counter by `n`. Creates the entry with
    /// `limit = 0` (unbounded) if it does not yet exist and no limit was registered.
    pub fn increment(&self, provider: &str, model: &str, period: QuotaPeriod, n: u64) {
        self.maybe_reset_daily();
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.counters.entry(Self::key(provider, model, period)).or_insert((0, 0));
        entry.0 += n;
    }

    /// Convenience for the Router's "increment the daily request counter by 1" step.
    pub fn increment_rpd(&self, provider: &str, model: &str) {
        self.increment(provider, model, QuotaPeriod::Rpd, 1);
    }

    /// Register (or update) the limit for a (provider, model, rpd) key, and report whether it is
    /// already exhausted. Used by the Router's chain-resolution filter (spec §4.1 step 1).
    pub fn rpd_exhausted(&self, provider: &str, model: &str, limit: u64) -> bool {
        self.maybe_reset_daily();
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.counters.entry(Self::key(provider, model, QuotaPeriod::Rpd)).or_insert((0, 0));
        entry.1 = limit;
        limit > 0 && entry.0 >= limit
    }

    /// `status(key) -> (used, limit)` per spec §4.3.
    pub fn status(&self, provider: &str, model: &str) -> (u64, u64) {
        let inner = self.inner.lock().unwrap();
        inner
            .counters
            .get(&Self::key(provider, model, QuotaPeriod::Rpd))
            .copied()
            .unwrap_or((0, 0))
    }

    /// Whether usage has crossed the warn threshold but is not yet exhausted — the "soft"
    /// warning a caller may surface to the user ahead of a hard `QuotaExceeded`.
    pub fn is_warning(&self, provider: &str, model: &str) -> bool {
        let (used, limit) = self.status(provider, model);
        if limit == 0 {
            return false;
        }
        let pct = (used as f32 / limit as f32) * 100.0;
        pct >= WARN_THRESHOLD_PCT && used < limit
    }

    /// `get_all_quota_status()` per `quota_manager.py` — a full snapshot for the Observability
    /// contract (`GET /observability/quota`, spec §6).
    pub fn all_status(&self) -> Vec<QuotaStatusEntry> {
        let inner = self.inner.lock().unwrap();
        inner
            .counters
            .iter()
            .map(|(key, (used, limit))| {
                let pct = if *limit == 0 { 0.0 } else { (*used as f32 / *limit as f32) * 100.0 };
                QuotaStatusEntry {
                    provider: key.provider.clone(),
                    model: key.model.clone(),
                    period: key.period,
                    used: *used,
                    limit: *limit,
                    pct,
                }
            })
            .collect()
    }

    /// Reset all `rpd` counters. `quota_manager.py`'s `reset_daily_counters()` resets every key
    /// containing `:rpd`; here that is simply every `QuotaPeriod::Rpd` entry's `used` field.
    pub fn reset_daily_counters(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (key, value) in inner.counters.iter_mut() {
            if key.period == QuotaPeriod::Rpd {
                value.0 = 0;
            }
        }
        inner.last_reset_date = Utc::now().date_naive();
    }

    fn maybe_reset_daily(&self) {
        let today = Utc::now().date_naive();
        let needs_reset = {
            let inner = self.inner.lock().unwrap();
            inner.last_reset_date != today
        };
        if needs_reset {
            self.reset_daily_counters();
        }
    }
}

impl Default for QuotaLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_and_status_round_trip() {
        let ledger = QuotaLedger::new();
        ledger.rpd_exhausted("openai", "gpt-4o-mini", 10);
        ledger.increment_rpd("openai", "gpt-4o-mini");
        ledger.increment_rpd("openai", "gpt-4o-mini");
        let (used, limit) = ledger.status("openai", "gpt-4o-mini");
        assert_eq!(used, 2);
        assert_eq!(limit, 10);
    }

    #[test]
    fn exhaustion_detection() {
        let ledger = QuotaLedger::new();
        for _ in 0..5 {
            ledger.increment_rpd("groq", "llama-3.1-70b-versatile");
        }
        assert!(ledger.rpd_exhausted("groq", "llama-3.1-70b-versatile", 5));
        assert!(!ledger.rpd_exhausted("groq", "llama-3.1-70b-versatile", 6));
    }

    #[test]
    fn warning_threshold() {
        let ledger = QuotaLedger::new();
        ledger.rpd_exhausted("google", "gemini-1.5-flash", 10);
        for _ in 0..8 {
            ledger.increment_rpd("google", "gemini-1.5-flash");
        }
        assert!(ledger.is_warning("google", "gemini-1.5-flash"));
    }
}
