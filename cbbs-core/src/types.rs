//! Shared small types: stable object identity and backoff configuration.
//!
//! Neither of these belongs to any one container: every consumer of the
//! multi-word CAS module (§4.3) needs [`Identity`] to sort its targets, and
//! every CAS-retry loop in the workspace wants the same [`BackoffPolicy`]
//! defaults so their behaviour under contention is consistent.

use std::sync::atomic::{AtomicU64, Ordering};

/// A stable, monotonically increasing identifier.
///
/// Pointer addresses are not a safe total order across allocator reuse (a
/// freed-and-reclaimed node can get the same address as a live one), so
/// anything that needs to totally order a set of objects, most notably
/// the multi-word CAS sort step, must instead compare a monotonic id
/// captured once at construction.
pub trait Identity {
    /// Returns this object's stable identifier.
    fn identity(&self) -> u64;
}

/// Process-wide monotonic id source.
///
/// One instance is shared by all MCAS descriptors and targets that need an
/// identifier; `next()` is lock-free and safe to call from any thread.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Creates a new allocator starting at id 1 (0 is reserved to mean
    /// "no identity assigned yet").
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocates and returns the next identifier.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Shared backoff configuration for CAS-retry loops.
///
/// Matches §6's "backoff policy" knobs: a base sleep duration and an
/// exponent cap. `nth_delay_millis` computes the delay for the n-th
/// consecutive failure, doubling each time up to
/// `base_millis * max_multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Base backoff duration in milliseconds.
    pub base_millis: u64,
    /// Maximum multiplier applied to `base_millis` (exponent cap).
    pub max_multiplier: u64,
}

impl BackoffPolicy {
    /// Returns the backoff duration for the `attempt`-th consecutive
    /// failure (0-indexed), capped at `base_millis * max_multiplier`.
    pub fn nth_delay_millis(&self, attempt: u32) -> u64 {
        let multiplier = 1u64.saturating_shl(attempt.min(63)).min(self.max_multiplier);
        self.base_millis.saturating_mul(multiplier)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_millis: 6,
            max_multiplier: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_allocator_is_monotonic() {
        let alloc = IdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        let c = alloc.next();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn backoff_caps_at_max_multiplier() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.nth_delay_millis(0), 6);
        assert_eq!(policy.nth_delay_millis(1), 12);
        assert_eq!(policy.nth_delay_millis(6), 6 * 64);
        assert_eq!(policy.nth_delay_millis(20), 6 * 64);
    }
}
