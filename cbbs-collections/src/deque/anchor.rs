use crossbeam::epoch::{Atomic, Guard, Shared};
use std::mem::ManuallyDrop;
use std::sync::atomic::Ordering;

/// A deque node: immutable payload, mutable `left`/`right` back-links that
/// stabilisation repairs after a push (§4.6).
///
/// `data` is `ManuallyDrop` for the same reason as the elimination array's
/// `Offer<T>`: whichever operation extracts the payload (a failed push
/// retrying via the elimination array, or a pop) does so with `ptr::read`
/// before the node's allocation is freed, so the allocator's drop glue
/// must not also run `T`'s destructor.
pub(crate) struct Node<T> {
    pub(crate) data: ManuallyDrop<T>,
    pub(crate) left: Atomic<Node<T>>,
    pub(crate) right: Atomic<Node<T>>,
}

impl<T> Node<T> {
    pub(crate) fn new(data: T) -> Self {
        Self {
            data: ManuallyDrop::new(data),
            left: Atomic::null(),
            right: Atomic::null(),
        }
    }

    pub(crate) fn left<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<T>> {
        self.left.load(Ordering::Acquire, guard)
    }

    pub(crate) fn right<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<T>> {
        self.right.load(Ordering::Acquire, guard)
    }
}

/// Status of an [`Anchor`] mid-push. `Stable` means both back-links are
/// consistent everywhere; `LPush`/`RPush` mean a push installed its new
/// node but the opposite-direction back-link at the far side of the splice
/// may still be stale until `stabilise_left`/`stabilise_right` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Stable,
    LPush,
    RPush,
}

/// The deque's entire state, replaced as one immutable unit by a single CAS
/// on the deque's anchor cell (§3 "Deque anchor").
pub(crate) struct Anchor<T> {
    left: Atomic<Node<T>>,
    right: Atomic<Node<T>>,
    pub(crate) status: Status,
    pub(crate) count: u64,
}

impl<T> Anchor<T> {
    pub(crate) fn empty() -> Self {
        Self {
            left: Atomic::null(),
            right: Atomic::null(),
            status: Status::Stable,
            count: 0,
        }
    }

    pub(crate) fn new(
        left: Shared<'_, Node<T>>,
        right: Shared<'_, Node<T>>,
        status: Status,
        count: u64,
    ) -> Self {
        Self {
            left: Atomic::from(left),
            right: Atomic::from(right),
            status,
            count,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub(crate) fn left<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<T>> {
        self.left.load(Ordering::Acquire, guard)
    }

    pub(crate) fn right<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<T>> {
        self.right.load(Ordering::Acquire, guard)
    }
}
