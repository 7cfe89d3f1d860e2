use super::anchor::{Anchor, Node, Status};
use crate::elimination::{Attempt, CancelToken, EliminationArray, EliminationConfig};
use cbbs_core::BackoffPolicy;
use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use std::mem::ManuallyDrop;
use std::sync::atomic::Ordering;

/// Which end of the deque an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Configuration for a [`Deque`] (§6 "deque" knobs).
#[derive(Debug, Clone, Copy)]
pub struct DequeConfig {
    /// Shared by both ends' elimination arrays.
    pub elimination: EliminationConfig,
    pub backoff: BackoffPolicy,
}

impl Default for DequeConfig {
    fn default() -> Self {
        Self {
            // Spec's "≤0 selects adaptive mode" default for the deque knob.
            elimination: EliminationConfig::adaptive(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// A lock-free double-ended queue over a two-anchor CAS scheme (§4.6).
///
/// The entire mutable state lives in one atomic cell holding an immutable
/// [`Anchor`]; every mutation replaces it wholesale. Contention at either
/// end is absorbed first by that end's [`EliminationArray`] before falling
/// back to retrying the anchor CAS.
pub struct Deque<T> {
    anchor: Atomic<Anchor<T>>,
    left_elim: EliminationArray<T>,
    right_elim: EliminationArray<T>,
    backoff: BackoffPolicy,
}

impl<T> Deque<T> {
    pub fn new() -> Self {
        Self::with_config(DequeConfig::default())
    }

    pub fn with_config(config: DequeConfig) -> Self {
        Self {
            anchor: Atomic::new(Anchor::empty()),
            left_elim: EliminationArray::new(config.elimination),
            right_elim: EliminationArray::new(config.elimination),
            backoff: config.backoff,
        }
    }

    pub fn push_left(&self, value: T) {
        self.push(Side::Left, value)
    }

    pub fn push_right(&self, value: T) {
        self.push(Side::Right, value)
    }

    pub fn pop_left(&self) -> Option<T> {
        self.pop(Side::Left)
    }

    pub fn pop_right(&self) -> Option<T> {
        self.pop(Side::Right)
    }

    /// Exact size: `count` lives inside the anchor itself, so unlike the
    /// list/set's auxiliary counters this reads as of one specific anchor
    /// snapshot rather than drifting across a multi-step update (a
    /// strictly stronger instance of §5's "weakly consistent" floor).
    pub fn len(&self) -> u64 {
        let guard = epoch::pin();
        let anchor = self.anchor.load(Ordering::Acquire, &guard);
        unsafe { anchor.deref() }.count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, side: Side, value: T) {
        let guard = epoch::pin();
        let cancel = CancelToken::new();
        let mut node = Owned::new(Node::new(value)).into_shared(&guard);

        loop {
            let anchor = self.anchor.load(Ordering::Acquire, &guard);
            let anchor_ref = unsafe { anchor.deref() };

            if anchor_ref.status != Status::Stable {
                self.help_stabilise(anchor, &guard);
                continue;
            }

            let new_anchor = if anchor_ref.is_empty() {
                Owned::new(Anchor::new(node, node, Status::Stable, 1))
            } else {
                match side {
                    Side::Left => {
                        let old_left = anchor_ref.left(&guard);
                        unsafe { node.deref() }.right.store(old_left, Ordering::Relaxed);
                        Owned::new(Anchor::new(
                            node,
                            anchor_ref.right(&guard),
                            Status::LPush,
                            anchor_ref.count + 1,
                        ))
                    }
                    Side::Right => {
                        let old_right = anchor_ref.right(&guard);
                        unsafe { node.deref() }.left.store(old_right, Ordering::Relaxed);
                        Owned::new(Anchor::new(
                            anchor_ref.left(&guard),
                            node,
                            Status::RPush,
                            anchor_ref.count + 1,
                        ))
                    }
                }
            };

            match self.anchor.compare_exchange(
                anchor,
                new_anchor,
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(installed) => {
                    if !anchor.is_null() {
                        unsafe { guard.defer_destroy(anchor) };
                    }
                    match side {
                        Side::Left => self.stabilise_left(installed, &guard),
                        Side::Right => self.stabilise_right(installed, &guard),
                    }
                    return;
                }
                Err(_) => {
                    // Spend the retry's backoff trying to hand the value
                    // off directly via this end's elimination array first.
                    let value = unsafe {
                        let data = std::ptr::read(&node.deref().data);
                        node.into_owned();
                        ManuallyDrop::into_inner(data)
                    };
                    let elim = match side {
                        Side::Left => &self.left_elim,
                        Side::Right => &self.right_elim,
                    };
                    match elim.try_add(value, &self.backoff, &cancel) {
                        Attempt::Matched => return,
                        Attempt::Unmatched(value) => {
                            node = Owned::new(Node::new(value)).into_shared(&guard);
                        }
                    }
                }
            }
        }
    }

    fn pop(&self, side: Side) -> Option<T> {
        let guard = epoch::pin();
        let cancel = CancelToken::new();

        loop {
            let anchor = self.anchor.load(Ordering::Acquire, &guard);
            let anchor_ref = unsafe { anchor.deref() };

            if anchor_ref.is_empty() {
                return None;
            }
            if anchor_ref.status != Status::Stable {
                self.help_stabilise(anchor, &guard);
                continue;
            }

            let (removed, new_anchor) = if anchor_ref.count == 1 {
                let removed = match side {
                    Side::Left => anchor_ref.left(&guard),
                    Side::Right => anchor_ref.right(&guard),
                };
                (removed, Owned::new(Anchor::empty()))
            } else {
                match side {
                    Side::Left => {
                        let old_left = anchor_ref.left(&guard);
                        let prev = unsafe { old_left.deref() }.right(&guard);
                        (
                            old_left,
                            Owned::new(Anchor::new(
                                prev,
                                anchor_ref.right(&guard),
                                Status::Stable,
                                anchor_ref.count - 1,
                            )),
                        )
                    }
                    Side::Right => {
                        let old_right = anchor_ref.right(&guard);
                        let prev = unsafe { old_right.deref() }.left(&guard);
                        (
                            old_right,
                            Owned::new(Anchor::new(
                                anchor_ref.left(&guard),
                                prev,
                                Status::Stable,
                                anchor_ref.count - 1,
                            )),
                        )
                    }
                }
            };

            match self.anchor.compare_exchange(
                anchor,
                new_anchor,
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => {
                    unsafe { guard.defer_destroy(anchor) };
                    let removed_ref = unsafe { removed.deref() };
                    // Break the left/right reference cycle at the removed
                    // node so SMR reclamation isn't fighting a live back-edge (§9).
                    match side {
                        Side::Left => removed_ref.right.store(Shared::null(), Ordering::Relaxed),
                        Side::Right => removed_ref.left.store(Shared::null(), Ordering::Relaxed),
                    }
                    let value = unsafe {
                        let data = std::ptr::read(&removed_ref.data);
                        guard.defer_destroy(removed);
                        ManuallyDrop::into_inner(data)
                    };
                    return Some(value);
                }
                Err(_) => {
                    let elim = match side {
                        Side::Left => &self.left_elim,
                        Side::Right => &self.right_elim,
                    };
                    if let Some(value) = elim.try_remove(&self.backoff, &cancel) {
                        return Some(value);
                    }
                }
            }
        }
    }

    fn help_stabilise(&self, anchor: Shared<'_, Anchor<T>>, guard: &Guard) {
        match unsafe { anchor.deref() }.status {
            Status::LPush => self.stabilise_left(anchor, guard),
            Status::RPush => self.stabilise_right(anchor, guard),
            Status::Stable => {}
        }
    }

    /// Repairs the stale back-link left by a completed left push, then
    /// flips the anchor's status back to `Stable`. Idempotent: whichever
    /// thread's CAS lands wins, everyone else's is a harmless no-op.
    fn stabilise_left(&self, anchor: Shared<'_, Anchor<T>>, guard: &Guard) {
        let anchor_ref = unsafe { anchor.deref() };
        let new_left = anchor_ref.left(guard);
        let prev = unsafe { new_left.deref() }.right(guard);

        let current = self.anchor.load(Ordering::Acquire, guard);
        if current != anchor || unsafe { current.deref() }.status != Status::LPush {
            return;
        }

        if !prev.is_null() {
            let prev_ref = unsafe { prev.deref() };
            let prev_left = prev_ref.left(guard);
            if prev_left != new_left {
                let _ = prev_ref.left.compare_exchange(
                    prev_left,
                    new_left,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                );
            }
        }

        let stabilised = Owned::new(Anchor::new(
            anchor_ref.left(guard),
            anchor_ref.right(guard),
            Status::Stable,
            anchor_ref.count,
        ));
        if self
            .anchor
            .compare_exchange(anchor, stabilised, Ordering::AcqRel, Ordering::Acquire, guard)
            .is_ok()
        {
            unsafe { guard.defer_destroy(anchor) };
        }
    }

    /// Right-hand mirror of [`Self::stabilise_left`].
    fn stabilise_right(&self, anchor: Shared<'_, Anchor<T>>, guard: &Guard) {
        let anchor_ref = unsafe { anchor.deref() };
        let new_right = anchor_ref.right(guard);
        let prev = unsafe { new_right.deref() }.left(guard);

        let current = self.anchor.load(Ordering::Acquire, guard);
        if current != anchor || unsafe { current.deref() }.status != Status::RPush {
            return;
        }

        if !prev.is_null() {
            let prev_ref = unsafe { prev.deref() };
            let prev_right = prev_ref.right(guard);
            if prev_right != new_right {
                let _ = prev_ref.right.compare_exchange(
                    prev_right,
                    new_right,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                );
            }
        }

        let stabilised = Owned::new(Anchor::new(
            anchor_ref.left(guard),
            anchor_ref.right(guard),
            Status::Stable,
            anchor_ref.count,
        ));
        if self
            .anchor
            .compare_exchange(anchor, stabilised, Ordering::AcqRel, Ordering::Acquire, guard)
            .is_ok()
        {
            unsafe { guard.defer_destroy(anchor) };
        }
    }
}

impl<T> Default for Deque<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: mirrors `EliminationArray`'s bound. A `Node<T>` is only ever
// dereferenced by a thread holding a pinned epoch guard.
unsafe impl<T: Send> Send for Deque<T> {}
unsafe impl<T: Send> Sync for Deque<T> {}
