use super::engine::OrderedList;
use crossbeam::epoch;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A lock-free sorted set of `T`, backed directly by the Harris-Michael
/// ordered list.
///
/// `len` and iteration are best-effort auxiliary observers (§1
/// "Non-goals"): they reflect some state between the start and end of the
/// call rather than a single linearised instant.
pub struct OrderedSet<T: Ord + Clone> {
    list: OrderedList<T>,
    len: AtomicUsize,
}

impl<T: Ord + Clone> OrderedSet<T> {
    pub fn new() -> Self {
        Self {
            list: OrderedList::new(),
            len: AtomicUsize::new(0),
        }
    }

    /// Inserts `key`. Returns `false` if an equal key was already present.
    pub fn insert(&self, key: T) -> bool {
        let guard = epoch::pin();
        let inserted = self.list.insert(key, &guard);
        if inserted {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        inserted
    }

    /// Removes `key`. Returns `false` if it was not present.
    pub fn remove(&self, key: &T) -> bool {
        let guard = epoch::pin();
        let removed = self.list.remove(key, &guard);
        if removed {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Wait-free membership test.
    pub fn contains(&self, key: &T) -> bool {
        let guard = epoch::pin();
        self.list.contains(key, &guard)
    }

    /// Best-effort size: a snapshot taken at some point during the call.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A weakly-consistent snapshot of the set's contents in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.list.snapshot_keys().into_iter()
    }
}

impl<T: Ord + Clone> Default for OrderedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
