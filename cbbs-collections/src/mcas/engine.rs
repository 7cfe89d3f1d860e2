use cbbs_core::{Error, IdAllocator, Identity};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

static IDS: IdAllocator = IdAllocator::new();

/// Tag bit distinguishing a plain word from an installed descriptor
/// pointer. Callers of [`McasCell::new`] must leave this bit free in every
/// value they store, true of any pointer-derived word, which is the only
/// kind of target this workspace ever builds an MCAS transaction over.
const DESC_TAG: u64 = 1;

#[derive(Clone, Copy)]
enum Slot {
    Value(u64),
    Desc(*const CcasDescriptor),
}

fn decode(raw: u64) -> Slot {
    if raw & DESC_TAG == DESC_TAG {
        Slot::Desc((raw & !DESC_TAG) as *const CcasDescriptor)
    } else {
        Slot::Value(raw)
    }
}

fn encode_desc(ptr: *const CcasDescriptor) -> u64 {
    (ptr as u64) | DESC_TAG
}

/// CCAS/MCAS decision state. Transitions monotonically
/// `Undecided -> {Successful, Failed}` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Undecided = 0,
    Successful = 1,
    Failed = 2,
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Status::Undecided,
            1 => Status::Successful,
            _ => Status::Failed,
        }
    }
}

/// What a [`CcasDescriptor`] conditions its completion on.
///
/// A tagged enum rather than a trait object: the only two shapes that ever
/// appear are a caller-owned standalone flag (the public [`ccas`] API) and
/// an in-flight [`McasDescriptor`] (used internally by [`mcas`]), and both
/// reduce to "read one status byte".
pub enum Condition {
    Standalone(Arc<AtomicU8>),
    Mcas(Arc<McasDescriptor>),
}

impl Condition {
    fn status(&self) -> Status {
        match self {
            Condition::Standalone(flag) => Status::from_u8(flag.load(Ordering::Acquire)),
            Condition::Mcas(descriptor) => descriptor.status(),
        }
    }
}

/// An in-flight conditional CAS: `target := new` iff `*target == expected`
/// and the condition still reads `Undecided` when this descriptor is
/// resolved (§4.3 "CCAS").
pub struct CcasDescriptor {
    expected: u64,
    new: u64,
    condition: Condition,
}

/// Shared decision state for one multi-word CAS attempt.
pub struct McasDescriptor {
    status: AtomicU8,
}

impl McasDescriptor {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(Status::Undecided as u8),
        }
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }
}

/// A single word participating in CCAS/MCAS transactions.
///
/// Carries a process-wide [`Identity`] so that [`mcas`] can sort a
/// transaction's targets into a stable total order, preventing livelock
/// between concurrent attempts that share some but not all of their
/// targets (§7 "Identity for MCAS sort").
pub struct McasCell {
    slot: AtomicU64,
    id: u64,
}

impl Identity for McasCell {
    fn identity(&self) -> u64 {
        self.id
    }
}

impl McasCell {
    pub fn new(value: u64) -> Self {
        // Violating this is always a caller bug, never a state a correct
        // caller can reach at runtime, so it's checked unconditionally
        // rather than gated behind `debug_assert!`.
        if value & DESC_TAG != 0 {
            panic!(
                "{}",
                Error::Invariant("mcas target words must leave the low bit free".into())
            );
        }
        Self {
            slot: AtomicU64::new(value),
            id: IDS.next(),
        }
    }

    /// Reads the cell's current value, helping any in-flight CCAS to
    /// completion first (§4.3 "Reading under MCAS").
    pub fn read(&self) -> u64 {
        loop {
            match decode(self.slot.load(Ordering::Acquire)) {
                Slot::Value(v) => return v,
                Slot::Desc(ptr) => {
                    resolve(&self.slot, ptr);
                }
            }
        }
    }

    /// Tries to install `desc` at this cell, conditioned on the cell
    /// currently holding `expected`. Helps and retries past any competing
    /// descriptor; returns `false` only once the cell is observed to hold
    /// some other plain value (the attempt is doomed).
    fn try_install(&self, expected: u64, desc_ptr: *const CcasDescriptor) -> bool {
        loop {
            let raw = self.slot.load(Ordering::Acquire);
            match decode(raw) {
                Slot::Value(v) if v == expected => {
                    match self.slot.compare_exchange(
                        raw,
                        encode_desc(desc_ptr),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return true,
                        Err(_) => continue,
                    }
                }
                Slot::Value(_) => return false,
                Slot::Desc(other) => {
                    if std::ptr::eq(other, desc_ptr) {
                        return true;
                    }
                    resolve(&self.slot, other);
                }
            }
        }
    }
}

/// Resolves the descriptor at `ptr` and CASes the cell away from it.
///
/// For a standalone CCAS (`condition` is [`Condition::Standalone`]), the
/// cell commits to `new` while the condition still reads `Undecided`, and
/// reverts to `expected` once the condition has been decided by whatever
/// companion operation owns it. This is the classic CCAS rule.
///
/// For an MCAS-internal descriptor (`condition` is [`Condition::Mcas`]),
/// `Undecided` is not yet a decision: the overall transaction's own
/// acquire phase is still running elsewhere. Writing `new` at that point
/// would let a helper observe a value no decided transaction ever
/// committed to (§8 invariant 4), so this case spins until the owning
/// [`mcas`] call has flipped the shared descriptor to `Successful` or
/// `Failed`, then commits accordingly.
///
/// Safe for any number of threads to call concurrently (idempotent) and
/// safe to call after the descriptor has already been superseded
/// elsewhere (the CAS below simply fails).
///
/// # Safety invariant
/// `ptr` must have been produced by a live (leaked) [`CcasDescriptor`]
/// installation; this module never frees an installed descriptor, so the
/// pointer is valid for the program's remaining lifetime.
fn resolve(slot: &AtomicU64, ptr: *const CcasDescriptor) -> Status {
    let desc = unsafe { &*ptr };
    loop {
        let status = desc.condition.status();
        let resolved_value = match (&desc.condition, status) {
            (Condition::Standalone(_), Status::Undecided) => desc.new,
            (Condition::Standalone(_), _) => desc.expected,
            (Condition::Mcas(_), Status::Successful) => desc.new,
            (Condition::Mcas(_), Status::Failed) => desc.expected,
            (Condition::Mcas(_), Status::Undecided) => continue,
        };
        let _ = slot.compare_exchange(
            encode_desc(ptr),
            resolved_value,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        return status;
    }
}

/// Standalone conditional CAS (§4.3 "CCAS"): sets `cell := new` iff the
/// cell currently holds `expected` and `condition` still reads `Undecided`
/// (`0`) once installed. Returns whether the write to `new` took effect.
///
/// `condition` is owned by the caller, who is expected to be racing this
/// call against a second operation that will eventually set `condition`
/// away from `Undecided` (the classic two-sided use of CCAS for composing
/// a double-CAS out of two independent single-word CASes).
pub fn ccas(cell: &McasCell, expected: u64, new: u64, condition: Arc<AtomicU8>) -> bool {
    let desc = Arc::new(CcasDescriptor {
        expected,
        new,
        condition: Condition::Standalone(condition),
    });
    let desc_ptr = Arc::into_raw(desc);
    if !cell.try_install(expected, desc_ptr) {
        // Never installed: reclaim immediately, nothing leaked.
        unsafe {
            drop(Arc::from_raw(desc_ptr));
        }
        return false;
    }
    resolve(&cell.slot, desc_ptr) == Status::Undecided
}

struct McasEntry<'a> {
    cell: &'a McasCell,
    expected: u64,
    ccas: Arc<CcasDescriptor>,
}

/// Multi-word CAS (§4.3 "MCAS"): `ops` is a list of
/// `(cell, expected, new)`. Either every cell transitions from its
/// expected value to its new value, or none do. Returns whether the
/// transaction succeeded.
///
/// Cells are sorted by [`Identity`] before the acquire phase so that two
/// transactions sharing some targets always attempt them in the same
/// order, which rules out the livelock a purely pointer-ordered or
/// submission-ordered sort would allow.
pub fn mcas(mut ops: Vec<(&McasCell, u64, u64)>) -> bool {
    ops.sort_by_key(|(cell, _, _)| cell.identity());

    let descriptor = Arc::new(McasDescriptor::new());
    let entries: Vec<McasEntry<'_>> = ops
        .iter()
        .map(|&(cell, expected, new)| McasEntry {
            cell,
            expected,
            ccas: Arc::new(CcasDescriptor {
                expected,
                new,
                condition: Condition::Mcas(descriptor.clone()),
            }),
        })
        .collect();

    let mut doomed = false;
    for entry in &entries {
        let desc_ptr = Arc::into_raw(entry.ccas.clone());
        if entry.cell.try_install(entry.expected, desc_ptr) {
            continue;
        }
        unsafe {
            drop(Arc::from_raw(desc_ptr));
        }
        doomed = true;
        break;
    }

    let final_status = if doomed {
        Status::Failed as u8
    } else {
        Status::Successful as u8
    };
    let _ = descriptor.status.compare_exchange(
        Status::Undecided as u8,
        final_status,
        Ordering::AcqRel,
        Ordering::Acquire,
    );
    let succeeded = descriptor.status() == Status::Successful;

    // Release phase: every entry's cell either still holds the original
    // expected value (never reached an install attempt) or a descriptor
    // pointer that now resolves deterministically; a plain read settles
    // both cases.
    for entry in &entries {
        entry.cell.read();
    }

    succeeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU8;
    use std::thread;

    #[test]
    fn ccas_succeeds_while_condition_undecided() {
        let cell = McasCell::new(10);
        let condition = Arc::new(AtomicU8::new(Status::Undecided as u8));
        assert!(ccas(&cell, 10, 20, condition));
        assert_eq!(cell.read(), 20);
    }

    #[test]
    fn ccas_reverts_when_condition_already_decided() {
        let cell = McasCell::new(10);
        let condition = Arc::new(AtomicU8::new(Status::Failed as u8));
        assert!(!ccas(&cell, 10, 20, condition));
        assert_eq!(cell.read(), 10);
    }

    #[test]
    fn ccas_fails_on_value_mismatch() {
        let cell = McasCell::new(10);
        let condition = Arc::new(AtomicU8::new(Status::Undecided as u8));
        assert!(!ccas(&cell, 99, 20, condition));
        assert_eq!(cell.read(), 10);
    }

    #[test]
    fn mcas_commits_all_or_nothing_on_success() {
        let a = McasCell::new(1);
        let b = McasCell::new(2);
        assert!(mcas(vec![(&a, 1, 10), (&b, 2, 20)]));
        assert_eq!(a.read(), 10);
        assert_eq!(b.read(), 20);
    }

    #[test]
    fn mcas_rolls_back_all_targets_on_mismatch() {
        let a = McasCell::new(1);
        let b = McasCell::new(99); // deliberately wrong "expected"
        assert!(!mcas(vec![(&a, 1, 10), (&b, 2, 20)]));
        assert_eq!(a.read(), 1);
        assert_eq!(b.read(), 99);
    }

    #[test]
    fn mcas_n_equals_one_reduces_to_plain_cas() {
        let a = McasCell::new(5);
        assert!(mcas(vec![(&a, 5, 6)]));
        assert_eq!(a.read(), 6);
        assert!(!mcas(vec![(&a, 5, 7)]));
        assert_eq!(a.read(), 6);
    }

    #[test]
    fn concurrent_mcas_transactions_over_overlapping_targets_linearise() {
        let a = Arc::new(McasCell::new(0));
        let b = Arc::new(McasCell::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let a = a.clone();
            let b = b.clone();
            handles.push(thread::spawn(move || loop {
                let av = a.read();
                let bv = b.read();
                if av == 1000 {
                    break;
                }
                if mcas(vec![(&a, av, av + 1), (&b, bv, bv + 1)]) {
                    break;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(a.read(), b.read());
    }
}

#[cfg(loom)]
mod loom_tests {
    use loom::sync::atomic::{AtomicU8, Ordering};
    use loom::sync::Arc;

    /// Model-checks just the decision-state machine every CCAS/MCAS
    /// descriptor relies on: `Undecided -> {Successful, Failed}` happens
    /// at most once, regardless of how many threads race the CAS.
    #[test]
    fn status_decides_exactly_once() {
        loom::model(|| {
            let status = Arc::new(AtomicU8::new(0));
            let mut handles = Vec::new();
            for decision in [1u8, 2u8] {
                let status = status.clone();
                handles.push(loom::thread::spawn(move || {
                    status
                        .compare_exchange(0, decision, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                }));
            }
            let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(results.iter().filter(|won| **won).count(), 1);
            assert_ne!(status.load(Ordering::Acquire), 0);
        });
    }
}
