use std::sync::atomic::{AtomicU64, Ordering};

/// Minimum age of the last check before the catalog is fetched again.
pub const REFRESH_TTL_MS: u64 = 60_000;

/// Time-based cache gate in front of the remote aggregation.
///
/// The last-check mark starts at zero, so the first consultation refreshes.
/// Checking and marking are separate steps; two concurrent callers may both
/// pass the gate, which the reconciliation lock tolerates.
#[derive(Debug, Default)]
pub struct RefreshGate {
    last_check_ms: AtomicU64,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `now_ms` lies strictly beyond the TTL window.
    pub fn should_refresh(last_check_ms: u64, now_ms: u64) -> bool {
        now_ms > last_check_ms.saturating_add(REFRESH_TTL_MS)
    }

    pub fn last_check_ms(&self) -> u64 {
        self.last_check_ms.load(Ordering::Acquire)
    }

    pub fn is_stale(&self, now_ms: u64) -> bool {
        Self::should_refresh(self.last_check_ms(), now_ms)
    }

    /// Records a check at `now_ms`. Never moves the mark backwards.
    pub fn mark(&self, now_ms: u64) {
        self.last_check_ms.fetch_max(now_ms, Ordering::AcqRel);
    }

    /// Marks the check before the fetch starts when the cache is stale.
    pub fn try_begin(&self, now_ms: u64) -> bool {
        if !self.is_stale(now_ms) {
            return false;
        }
        self.mark(now_ms);
        true
    }
}
