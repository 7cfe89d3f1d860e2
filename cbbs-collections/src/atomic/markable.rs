use crossbeam::epoch::{Atomic, CompareExchangeError, Guard, Owned, Shared};
use std::sync::atomic::Ordering;

/// Bit used to mark a node as logically deleted.
const MARK: usize = 0b1;

/// An atomic `(pointer, mark)` pair.
///
/// `mark = true` means the referenced node is logically deleted: any
/// thread observing the mark must help unlink the node (by CAS-swinging
/// the predecessor's reference past it) before treating the list as
/// consistent again. The mark rides in the tag bits `crossbeam-epoch`
/// already reserves on every `Atomic<T>`, so a `Markable<T>` costs nothing
/// over a plain atomic pointer.
#[derive(Debug)]
pub struct Markable<T> {
    inner: Atomic<T>,
}

impl<T> Markable<T> {
    /// An unmarked null reference.
    pub fn null() -> Self {
        Self {
            inner: Atomic::null(),
        }
    }

    /// An unmarked reference to a freshly allocated `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Atomic::new(value),
        }
    }

    /// Loads the current `(pointer, mark)` pair.
    pub fn load<'g>(&self, ordering: Ordering, guard: &'g Guard) -> (Shared<'g, T>, bool) {
        let shared = self.inner.load(ordering, guard);
        (shared.with_tag(0), shared.tag() & MARK != 0)
    }

    /// Stores `new` unconditionally, preserving `mark`.
    pub fn store(&self, new: Shared<'_, T>, mark: bool, ordering: Ordering) {
        let tagged = new.with_tag(if mark { MARK } else { 0 });
        self.inner.store(tagged, ordering);
    }

    /// Publishes a freshly owned node, taking ownership into the cell.
    pub fn store_owned(&self, new: Owned<T>, mark: bool, ordering: Ordering) {
        let tagged = new.with_tag(if mark { MARK } else { 0 });
        self.inner.store(tagged, ordering);
    }

    /// Atomically swaps `(expected_ptr, expected_mark)` for
    /// `(new_ptr, new_mark)`. Returns the previously-installed pointer on
    /// success, or the actually-observed pointer on failure, exactly as
    /// `compare_exchange` does; mark bits are folded into both.
    #[allow(clippy::result_large_err)]
    pub fn compare_and_set<'g>(
        &self,
        expected_ptr: Shared<'g, T>,
        expected_mark: bool,
        new_ptr: Shared<'g, T>,
        new_mark: bool,
        success: Ordering,
        failure: Ordering,
        guard: &'g Guard,
    ) -> Result<Shared<'g, T>, CompareExchangeError<'g, T, Shared<'g, T>>> {
        let expected = expected_ptr.with_tag(if expected_mark { MARK } else { 0 });
        let new = new_ptr.with_tag(if new_mark { MARK } else { 0 });
        self.inner
            .compare_exchange(expected, new, success, failure, guard)
    }

    /// Same as [`Markable::compare_and_set`] but installs a freshly owned
    /// node rather than an already-shared one (used by `add`, which is
    /// publishing a brand new node for the first time).
    #[allow(clippy::result_large_err)]
    pub fn compare_and_set_owned<'g>(
        &self,
        expected_ptr: Shared<'g, T>,
        expected_mark: bool,
        new: Owned<T>,
        new_mark: bool,
        success: Ordering,
        failure: Ordering,
        guard: &'g Guard,
    ) -> Result<Shared<'g, T>, crossbeam::epoch::CompareExchangeError<'g, T, Owned<T>>> {
        let expected = expected_ptr.with_tag(if expected_mark { MARK } else { 0 });
        let new = new.with_tag(if new_mark { MARK } else { 0 });
        self.inner
            .compare_exchange(expected, new, success, failure, guard)
    }

    /// Marks the currently-installed pointer for logical deletion, failing
    /// if the cell no longer holds `expected_ptr` unmarked.
    pub fn try_mark<'g>(
        &self,
        expected_ptr: Shared<'g, T>,
        success: Ordering,
        failure: Ordering,
        guard: &'g Guard,
    ) -> bool {
        self.compare_and_set(
            expected_ptr,
            false,
            expected_ptr,
            true,
            success,
            failure,
            guard,
        )
        .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::epoch;

    #[test]
    fn fresh_cell_is_null_and_unmarked() {
        let cell: Markable<u32> = Markable::null();
        let guard = epoch::pin();
        let (ptr, mark) = cell.load(Ordering::Acquire, &guard);
        assert!(ptr.is_null());
        assert!(!mark);
    }

    #[test]
    fn mark_then_cas_requires_matching_mark() {
        let cell = Markable::new(7u32);
        let guard = epoch::pin();
        let (ptr, mark) = cell.load(Ordering::Acquire, &guard);
        assert!(!mark);

        assert!(cell.try_mark(ptr, Ordering::AcqRel, Ordering::Acquire, &guard));
        let (_, mark_after) = cell.load(Ordering::Acquire, &guard);
        assert!(mark_after);

        // A CAS that still expects the unmarked state must now fail.
        let new = Owned::new(9u32);
        assert!(cell
            .compare_and_set_owned(
                ptr,
                false,
                new,
                false,
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard
            )
            .is_err());
    }
}

#[cfg(loom)]
mod loom_tests {
    use loom::sync::atomic::{AtomicUsize, Ordering};
    use loom::sync::Arc;

    const MARK: usize = 0b1;

    /// Model-checks the bit-packing this module relies on in isolation
    /// (`crossbeam::epoch`'s own `Atomic` isn't loom-instrumented, so the
    /// tag-bit CAS dance is re-modelled here over a plain `AtomicUsize`):
    /// a racing `try_mark` and pointer-swinging CAS can't both win against
    /// the same unmarked word, and once marked the word never loses its
    /// mark bit again.
    #[test]
    fn mark_and_unlink_cas_cannot_both_win() {
        loom::model(|| {
            let word = Arc::new(AtomicUsize::new(0x10)); // unmarked pointer-ish value
            let marker = {
                let word = word.clone();
                loom::thread::spawn(move || {
                    word.compare_exchange(
                        0x10,
                        0x10 | MARK,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                })
            };
            let swinger = {
                let word = word.clone();
                loom::thread::spawn(move || {
                    word.compare_exchange(0x10, 0x20, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                })
            };

            let marked = marker.join().unwrap();
            let swung = swinger.join().unwrap();
            assert!(!(marked && swung), "mark and unlink both won the same CAS");

            let final_word = word.load(Ordering::Acquire);
            if marked {
                assert_eq!(final_word & MARK, MARK);
            }
        });
    }
}
