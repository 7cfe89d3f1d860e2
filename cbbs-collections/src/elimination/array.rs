use super::config::EliminationConfig;
use crossbeam::epoch::{self, Atomic, CompareExchangeError, Owned, Shared};
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use cbbs_core::BackoffPolicy;

/// Tag value for an empty slot (no allocation behind the pointer).
const EMPTY: usize = 0;
/// Tag value for a tombstone: a remover is waiting here.
const TOMB: usize = 1;
/// Tag value for a consumed offer: the adder's offering was matched.
const TAKEN: usize = 2;

/// The payload of a slot while an adder's offering is outstanding.
///
/// `data` is `ManuallyDrop` because the node is reclaimed through
/// crossbeam's epoch GC, which runs the node's destructor on whatever is
/// still inside it; whichever thread wins the race to take the offering
/// extracts `data` with `ptr::read` first, so the GC must not drop it a
/// second time.
struct Offer<T> {
    data: ManuallyDrop<T>,
}

/// Outcome of a matched/unmatched elimination attempt.
pub enum Attempt<T> {
    /// The attempt was matched by a concurrent counterpart.
    Matched,
    /// No match within the time budget; the caller gets its value back to
    /// retry against the central structure.
    Unmatched(T),
}

/// Running match/failure counters, exposed for the adaptive-sizing variant
/// and for observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct EliminationStats {
    pub matches: u64,
    pub failures: u64,
}

/// A cooperative cancellation flag for the elimination array's bounded
/// waits (§5 "Cancellation").
#[derive(Debug, Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Check-in interval for a cancellation-aware sleep.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

fn cancellable_sleep(total: Duration, cancel: &CancelToken) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if cancel.is_cancelled() {
            return false;
        }
        let step = remaining.min(POLL_INTERVAL);
        std::thread::sleep(step);
        remaining -= step;
    }
    !cancel.is_cancelled()
}

/// Pairs concurrent adds and removes without touching a central structure.
///
/// See module docs and spec §4.2 for the algorithm. Every op pins an epoch
/// guard for the duration of its probe.
pub struct EliminationArray<T> {
    add_slots: Vec<Atomic<Offer<T>>>,
    remove_slots: Vec<Atomic<Offer<T>>>,
    effective_size: AtomicU64,
    lookahead: usize,
    adaptive: Option<super::config::AdaptiveConfig>,
    matches: AtomicU64,
    failures: AtomicU64,
}

impl<T> EliminationArray<T> {
    pub fn new(config: EliminationConfig) -> Self {
        let backing = config.backing_size().max(1);
        let mut add_slots = Vec::with_capacity(backing);
        let mut remove_slots = Vec::with_capacity(backing);
        for _ in 0..backing {
            add_slots.push(Atomic::null());
            remove_slots.push(Atomic::null());
        }
        Self {
            add_slots,
            remove_slots,
            effective_size: AtomicU64::new(config.initial_effective_size().max(1) as u64),
            lookahead: config.lookahead.max(1),
            adaptive: config.adaptive,
            matches: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> EliminationStats {
        EliminationStats {
            matches: self.matches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn effective_size(&self) -> usize {
        (self.effective_size.load(Ordering::Relaxed) as usize).min(self.add_slots.len())
    }

    fn record_match(&self) {
        self.matches.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures % 200 == 0 {
            self.rebalance();
        }
    }

    /// Adaptive sizing: shrink the probing window when failures dominate,
    /// grow it when matches dominate, bounded by `[floor, ceiling]`.
    fn rebalance(&self) {
        let Some(adaptive) = self.adaptive else {
            return;
        };
        let matches = self.matches.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed).max(1);
        let current = self.effective_size.load(Ordering::Relaxed) as usize;
        let next = if failures > matches.saturating_mul(4) {
            (current / 2).max(adaptive.floor)
        } else if matches > failures {
            (current * 2).min(adaptive.ceiling)
        } else {
            current
        };
        if next != current {
            log::debug!("elimination array resizing {current} -> {next} slots");
            self.effective_size.store(next as u64, Ordering::Relaxed);
        }
    }

    /// Attempts to hand `obj` off to a concurrent `try_remove`.
    pub fn try_add(&self, obj: T, backoff: &BackoffPolicy, cancel: &CancelToken) -> Attempt<T> {
        let guard = epoch::pin();
        let size = self.effective_size();
        let start = fastrand::usize(..size);
        let mut obj = obj;

        for step in 0..self.lookahead {
            let i = (start + step) % size;

            // 1. A remover may already be waiting on this index's tombstone.
            let remove_cell = &self.remove_slots[i];
            let remove_cur = remove_cell.load(Ordering::Acquire, &guard);
            if remove_cur.is_null() && remove_cur.tag() == TOMB {
                let offer = Owned::new(Offer {
                    data: ManuallyDrop::new(obj),
                });
                match remove_cell.compare_exchange(
                    remove_cur,
                    offer,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                ) {
                    Ok(_installed) => {
                        self.record_match();
                        return Attempt::Matched;
                    }
                    Err(e) => {
                        obj = ManuallyDrop::into_inner(e.new.into_box().data);
                        continue;
                    }
                }
            }

            // 2. Otherwise try to post our own offering.
            let add_cell = &self.add_slots[i];
            let add_cur = add_cell.load(Ordering::Acquire, &guard);
            if !(add_cur.is_null() && add_cur.tag() == EMPTY) {
                continue;
            }
            let offer = Owned::new(Offer {
                data: ManuallyDrop::new(obj),
            });
            let installed = match add_cell.compare_exchange(
                add_cur,
                offer,
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(installed) => installed,
                Err(e) => {
                    obj = ManuallyDrop::into_inner(e.new.into_box().data);
                    continue;
                }
            };

            cancellable_sleep(Duration::from_millis(backoff.base_millis), cancel);

            let reread = add_cell.load(Ordering::Acquire, &guard);
            if reread.is_null() && reread.tag() == TAKEN {
                let empty = Shared::<Offer<T>>::null().with_tag(EMPTY);
                let _ = add_cell.compare_exchange(
                    reread,
                    empty,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                );
                self.record_match();
                return Attempt::Matched;
            }

            if reread == installed {
                let empty = Shared::<Offer<T>>::null().with_tag(EMPTY);
                if add_cell
                    .compare_exchange(installed, empty, Ordering::AcqRel, Ordering::Acquire, &guard)
                    .is_ok()
                {
                    let reclaimed = unsafe {
                        let data = std::ptr::read(&installed.deref().data);
                        guard.defer_destroy(installed);
                        ManuallyDrop::into_inner(data)
                    };
                    obj = reclaimed;
                    self.record_failure();
                    continue;
                }
                // Lost a race to a helper; reread on the next loop iteration.
            }
            // Slot moved under us in some other way (stale TAKEN cleared by
            // the matching remover, e.g.); treat as unmatched this round and
            // try the next candidate index with the same object.
        }

        self.record_failure();
        Attempt::Unmatched(obj)
    }

    /// Attempts to take an object handed off by a concurrent `try_add`.
    pub fn try_remove(&self, backoff: &BackoffPolicy, cancel: &CancelToken) -> Option<T> {
        let guard = epoch::pin();
        let size = self.effective_size();
        let start = fastrand::usize(..size);

        for step in 0..self.lookahead {
            let i = (start + step) % size;

            // 1. An adder may already be offering here.
            let add_cell = &self.add_slots[i];
            let add_cur = add_cell.load(Ordering::Acquire, &guard);
            if !add_cur.is_null() {
                let taken = Shared::<Offer<T>>::null().with_tag(TAKEN);
                if let Ok(prev) = add_cell.compare_exchange(
                    add_cur,
                    taken,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                ) {
                    let value = unsafe {
                        let data = std::ptr::read(&prev.deref().data);
                        guard.defer_destroy(prev);
                        ManuallyDrop::into_inner(data)
                    };
                    self.record_match();
                    return Some(value);
                }
                continue;
            }

            // 2. Otherwise post a tombstone and wait for an adder.
            let remove_cell = &self.remove_slots[i];
            let remove_cur = remove_cell.load(Ordering::Acquire, &guard);
            if !(remove_cur.is_null() && remove_cur.tag() == EMPTY) {
                continue;
            }
            let tomb = Shared::<Offer<T>>::null().with_tag(TOMB);
            if remove_cell
                .compare_exchange(remove_cur, tomb, Ordering::AcqRel, Ordering::Acquire, &guard)
                .is_err()
            {
                continue;
            }

            cancellable_sleep(Duration::from_millis(backoff.base_millis), cancel);

            let reread = remove_cell.load(Ordering::Acquire, &guard);
            if !reread.is_null() {
                let empty = Shared::<Offer<T>>::null().with_tag(EMPTY);
                if let Ok(prev) = remove_cell.compare_exchange(
                    reread,
                    empty,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                ) {
                    let value = unsafe {
                        let data = std::ptr::read(&prev.deref().data);
                        guard.defer_destroy(prev);
                        ManuallyDrop::into_inner(data)
                    };
                    self.record_match();
                    return Some(value);
                }
                continue;
            }

            // Still a tombstone: nobody showed up, clean up and try the
            // next index.
            let empty = Shared::<Offer<T>>::null().with_tag(EMPTY);
            let _ = remove_cell.compare_exchange(
                tomb,
                empty,
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            );
        }

        self.record_failure();
        None
    }
}

// SAFETY: `Offer<T>` is only ever accessed by the thread that wins the CAS
// transitioning it away, matching `Atomic<T>`'s own Send + Sync bounds.
unsafe impl<T: Send> Send for EliminationArray<T> {}
unsafe impl<T: Send> Sync for EliminationArray<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_pair_matches() {
        let array: Arc<EliminationArray<u32>> = Arc::new(EliminationArray::new(EliminationConfig {
            size: 4,
            lookahead: 4,
            adaptive: None,
        }));
        let backoff = BackoffPolicy {
            base_millis: 5,
            max_multiplier: 1,
        };
        let cancel = CancelToken::new();

        let remover = {
            let array = array.clone();
            thread::spawn(move || array.try_remove(&BackoffPolicy { base_millis: 20, max_multiplier: 1 }, &CancelToken::new()))
        };
        thread::sleep(Duration::from_millis(2));
        let outcome = array.try_add(42, &backoff, &cancel);
        let removed = remover.join().unwrap();

        // Either the add matched the remover, or the remover timed out and
        // the add's own offering window also timed out (no match possible
        // with a single producer); the only incorrect outcome is the value
        // disappearing or being duplicated.
        match outcome {
            Attempt::Matched => assert_eq!(removed, Some(42)),
            Attempt::Unmatched(v) => {
                assert_eq!(v, 42);
            }
        }
    }

    #[test]
    fn unmatched_add_returns_value() {
        let array: EliminationArray<String> = EliminationArray::new(EliminationConfig {
            size: 2,
            lookahead: 1,
            adaptive: None,
        });
        let backoff = BackoffPolicy {
            base_millis: 1,
            max_multiplier: 1,
        };
        let cancel = CancelToken::new();
        match array.try_add("hello".to_string(), &backoff, &cancel) {
            Attempt::Unmatched(v) => assert_eq!(v, "hello"),
            Attempt::Matched => panic!("nothing should have matched"),
        }
    }

    #[test]
    fn cancellation_is_propagated_as_unmatched() {
        let array: EliminationArray<u8> = EliminationArray::new(EliminationConfig {
            size: 2,
            lookahead: 1,
            adaptive: None,
        });
        let cancel = CancelToken::new();
        cancel.cancel();
        let backoff = BackoffPolicy {
            base_millis: 50,
            max_multiplier: 1,
        };
        match array.try_add(1, &backoff, &cancel) {
            Attempt::Unmatched(v) => assert_eq!(v, 1),
            Attempt::Matched => panic!("cancelled wait should not match here"),
        }
    }
}
