use crate::atomic::Markable;
use crossbeam::epoch::{self, Guard, Owned, Shared};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::Ordering;

/// A node in the ordered list. `next`'s mark bit records this node's own
/// logical-deletion state, per the Harris scheme: a node marks its own
/// successor pointer, not a separate flag on itself.
pub(crate) struct Node<T> {
    pub(crate) key: T,
    pub(crate) next: Markable<Node<T>>,
}

/// The lock-free engine shared by [`super::OrderedSet`] and
/// [`crate::hashset`]. `T` carries whatever total order the caller needs:
/// plain user keys for a standalone set, split-ordered `u32` keys paired
/// with a dummy flag for the hash set's bucketed view.
pub(crate) struct OrderedList<T> {
    head: Markable<Node<T>>,
}

impl<T: Ord + Clone> OrderedList<T> {
    pub(crate) fn new() -> Self {
        Self {
            head: Markable::null(),
        }
    }

    /// Returns `(prev, curr)`: `prev` is the markable cell currently
    /// pointing at `curr`, the first unmarked node with `key >= target` (or
    /// null at the end of the list). Physically unlinks any marked node it
    /// passes over along the way.
    pub(crate) fn find<'g>(
        &'g self,
        key: &T,
        guard: &'g Guard,
    ) -> (&'g Markable<Node<T>>, Shared<'g, Node<T>>) {
        self.find_from(&self.head, key, guard)
    }

    /// Same as [`Self::find`] but starts the scan at `start` rather than
    /// the list head. Sound whenever `start` is known to sit at or before
    /// `key`'s sorted position. [`crate::hashset`] uses this to resume
    /// from a bucket's dummy node instead of rescanning from the front.
    pub(crate) fn find_from<'g>(
        &'g self,
        start: &'g Markable<Node<T>>,
        key: &T,
        guard: &'g Guard,
    ) -> (&'g Markable<Node<T>>, Shared<'g, Node<T>>) {
        'retry: loop {
            let mut prev = start;
            let (mut curr, _) = prev.load(Ordering::Acquire, guard);

            loop {
                if curr.is_null() {
                    return (prev, curr);
                }
                let curr_ref = unsafe { curr.deref() };
                let (next, marked) = curr_ref.next.load(Ordering::Acquire, guard);

                if marked {
                    match prev.compare_and_set(
                        curr,
                        false,
                        next,
                        false,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        guard,
                    ) {
                        Ok(_) => unsafe { guard.defer_destroy(curr) },
                        Err(_) => continue 'retry,
                    }
                    curr = next;
                    continue;
                }

                if curr_ref.key.cmp(key) != CmpOrdering::Less {
                    return (prev, curr);
                }
                prev = &curr_ref.next;
                curr = next;
            }
        }
    }

    /// Inserts `key` in sorted position. Returns `false` without modifying
    /// the list if an equal key is already present.
    pub(crate) fn insert(&self, key: T, guard: &Guard) -> bool {
        self.insert_from(&self.head, key, guard)
    }

    /// Same as [`Self::insert`] but the search starts at `start`.
    pub(crate) fn insert_from<'g>(
        &'g self,
        start: &'g Markable<Node<T>>,
        key: T,
        guard: &'g Guard,
    ) -> bool {
        loop {
            let (prev, curr) = self.find_from(start, &key, guard);
            if !curr.is_null() && unsafe { curr.deref() }.key == key {
                return false;
            }

            let node = Owned::new(Node {
                key: key.clone(),
                next: Markable::null(),
            });
            node.next.store(curr, false, Ordering::Relaxed);

            match prev.compare_and_set_owned(
                curr,
                false,
                node,
                false,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    /// Removes `key` if present: marks it, then attempts the physical
    /// unlink. A failed unlink is harmless; the next `find` over this
    /// span completes it.
    pub(crate) fn remove(&self, key: &T, guard: &Guard) -> bool {
        self.remove_from(&self.head, key, guard)
    }

    /// Same as [`Self::remove`] but the search starts at `start`.
    pub(crate) fn remove_from<'g>(
        &'g self,
        start: &'g Markable<Node<T>>,
        key: &T,
        guard: &'g Guard,
    ) -> bool {
        loop {
            let (prev, curr) = self.find_from(start, key, guard);
            if curr.is_null() || unsafe { curr.deref() }.key != *key {
                return false;
            }
            let curr_ref = unsafe { curr.deref() };
            let (succ, marked) = curr_ref.next.load(Ordering::Acquire, guard);
            if marked {
                continue;
            }
            if curr_ref
                .next
                .compare_and_set(succ, false, succ, true, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_err()
            {
                continue;
            }

            if prev
                .compare_and_set(curr, false, succ, false, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_ok()
            {
                unsafe { guard.defer_destroy(curr) };
            }
            return true;
        }
    }

    /// Wait-free membership test: a single pass, no helping, no CAS.
    pub(crate) fn contains(&self, key: &T, guard: &Guard) -> bool {
        self.contains_from(&self.head, key, guard)
    }

    /// Same as [`Self::contains`] but the scan starts at `start`.
    pub(crate) fn contains_from(
        &self,
        start: &Markable<Node<T>>,
        key: &T,
        guard: &Guard,
    ) -> bool {
        let (mut curr, _) = start.load(Ordering::Acquire, guard);
        while !curr.is_null() {
            let node = unsafe { curr.deref() };
            match node.key.cmp(key) {
                CmpOrdering::Less => {
                    let (next, _) = node.next.load(Ordering::Acquire, guard);
                    curr = next;
                }
                CmpOrdering::Equal => {
                    let (_, marked) = node.next.load(Ordering::Acquire, guard);
                    return !marked;
                }
                CmpOrdering::Greater => return false,
            }
        }
        false
    }

    /// Finds or inserts `key`, returning a pointer to the node in the list
    /// either way. Used by the hash set to materialise bucket dummies
    /// idempotently: concurrent materialisers converge on the same node.
    pub(crate) fn find_or_insert<'g>(&'g self, key: T, guard: &'g Guard) -> Shared<'g, Node<T>> {
        self.find_or_insert_from(&self.head, key, guard)
    }

    /// Same as [`Self::find_or_insert`] but the search starts at `start`.
    pub(crate) fn find_or_insert_from<'g>(
        &'g self,
        start: &'g Markable<Node<T>>,
        key: T,
        guard: &'g Guard,
    ) -> Shared<'g, Node<T>> {
        loop {
            let (prev, curr) = self.find_from(start, &key, guard);
            if !curr.is_null() && unsafe { curr.deref() }.key == key {
                return curr;
            }

            let node = Owned::new(Node {
                key: key.clone(),
                next: Markable::null(),
            });
            node.next.store(curr, false, Ordering::Relaxed);

            match prev.compare_and_set_owned(
                curr,
                false,
                node,
                false,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(installed) => return installed,
                Err(_) => continue,
            }
        }
    }

    /// Weakly-consistent forward walk yielding a clone of every unmarked
    /// node's key, in list order.
    pub(crate) fn snapshot_keys(&self) -> Vec<T> {
        let guard = epoch::pin();
        let mut out = Vec::new();
        let (mut curr, _) = self.head.load(Ordering::Acquire, &guard);
        while !curr.is_null() {
            let node = unsafe { curr.deref() };
            let (next, marked) = node.next.load(Ordering::Acquire, &guard);
            if !marked {
                out.push(node.key.clone());
            }
            curr = next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_sorted_order() {
        let list: OrderedList<i32> = OrderedList::new();
        let guard = epoch::pin();
        for key in [5, 1, 3, 2, 4] {
            assert!(list.insert(key, &guard));
        }
        assert_eq!(list.snapshot_keys(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let list: OrderedList<i32> = OrderedList::new();
        let guard = epoch::pin();
        assert!(list.insert(7, &guard));
        assert!(!list.insert(7, &guard));
        assert_eq!(list.snapshot_keys(), vec![7]);
    }

    #[test]
    fn remove_unlinks_and_contains_reflects_it() {
        let list: OrderedList<i32> = OrderedList::new();
        let guard = epoch::pin();
        for key in [1, 2, 3] {
            list.insert(key, &guard);
        }
        assert!(list.remove(&2, &guard));
        assert!(!list.remove(&2, &guard));
        assert!(list.contains(&1, &guard));
        assert!(!list.contains(&2, &guard));
        assert!(list.contains(&3, &guard));
        assert_eq!(list.snapshot_keys(), vec![1, 3]);
    }

    #[test]
    fn find_or_insert_converges_on_one_node() {
        let list: OrderedList<i32> = OrderedList::new();
        let guard = epoch::pin();
        let a = list.find_or_insert(42, &guard);
        let b = list.find_or_insert(42, &guard);
        assert_eq!(a.as_raw(), b.as_raw());
        assert_eq!(list.snapshot_keys(), vec![42]);
    }
}
