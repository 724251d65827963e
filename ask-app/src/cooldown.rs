//! Per-requester cooldown gate for `/ask`.

use ask_platform::UserId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Expired entries are swept after this many admissions.
const PRUNE_EVERY: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    Admitted,
    /// Rounded up to whole seconds.
    Rejected { remaining_seconds: u64 },
}

/// Maps each requester to the instant their cooldown ends.
///
/// The check and the write happen under one map entry lock, so two concurrent
/// requests from the same user cannot both be admitted. Expired entries are
/// dropped every few hundred admissions.
#[derive(Debug)]
pub struct CooldownGuard {
    period: Duration,
    entries: DashMap<UserId, Instant>,
    admissions: AtomicU64,
}

impl CooldownGuard {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            entries: DashMap::new(),
            admissions: AtomicU64::new(0),
        }
    }

    pub fn try_admit(&self, requester: &UserId, now: Instant) -> CooldownDecision {
        let decision = self.check_and_mark(requester, now);
        if decision == CooldownDecision::Admitted
            && (self.admissions.fetch_add(1, Ordering::Relaxed) + 1) % PRUNE_EVERY == 0
        {
            self.prune(now);
        }
        decision
    }

    fn check_and_mark(&self, requester: &UserId, now: Instant) -> CooldownDecision {
        match self.entries.entry(requester.clone()) {
            Entry::Occupied(mut entry) => {
                let ends_at = *entry.get();
                if now < ends_at {
                    return CooldownDecision::Rejected {
                        remaining_seconds: ceil_seconds(ends_at - now),
                    };
                }
                entry.insert(now + self.period);
            }
            Entry::Vacant(entry) => {
                entry.insert(now + self.period);
            }
        }
        CooldownDecision::Admitted
    }

    fn prune(&self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, ends_at| now < *ends_at);
        tracing::debug!(
            pruned = before.saturating_sub(self.entries.len()),
            tracked = self.entries.len(),
            "expired cooldowns pruned"
        );
    }

    /// Drop the requester's cooldown so a failed request can be retried at once.
    pub fn release(&self, requester: &UserId) {
        if self.entries.remove(requester).is_some() {
            tracing::debug!(requester = %requester, "cooldown released");
        }
    }

    #[cfg(test)]
    pub fn is_cooling_down(&self, requester: &UserId, now: Instant) -> bool {
        self.entries
            .get(requester)
            .is_some_and(|ends_at| now < *ends_at)
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}

fn ceil_seconds(remaining: Duration) -> u64 {
    let seconds = remaining.as_nanos().div_ceil(1_000_000_000);
    u64::try_from(seconds).unwrap_or(u64::MAX)
}
