use cbbs_core::IdAllocator;
use std::cmp::Ordering;

static TIE_BREAKS: IdAllocator = IdAllocator::new();

/// An element of the underlying ordered list: either a bucket dummy
/// (`value: None`) or a real entry. `split_key` gives the split-ordered
/// sort position §4.5 requires; `value` is the actual element, compared
/// on lookup so that two different elements sharing a 32-bit hash are not
/// mistaken for each other. `tie_break` is a construction-order id used
/// only to keep same-`split_key`, different-`value` entries in a
/// consistent relative order (§4.5 never assigns meaning to the order
/// *within* one hash's run of entries, only across hashes).
pub(crate) struct SplitEntry<T> {
    pub(crate) split_key: u32,
    pub(crate) value: Option<T>,
    tie_break: u64,
}

impl<T> SplitEntry<T> {
    /// A dummy anchoring bucket `b`: split key `bit_reverse(b)`, low bit
    /// clear.
    pub(crate) fn dummy(bucket: u32) -> Self {
        Self {
            split_key: bucket.reverse_bits(),
            value: None,
            tie_break: TIE_BREAKS.next(),
        }
    }

    /// A real entry for a value whose 32-bit hash is `hash`: split key
    /// `bit_reverse(hash) | 1`, low bit set.
    pub(crate) fn real(hash: u32, value: T) -> Self {
        Self {
            split_key: hash.reverse_bits() | 1,
            value: Some(value),
            tie_break: TIE_BREAKS.next(),
        }
    }

    /// A lookup key for `hash` carrying `value` itself as its payload, so
    /// a hash collision with some other, never-inserted value doesn't
    /// read as a match.
    pub(crate) fn probe(hash: u32, value: T) -> Self {
        Self {
            split_key: hash.reverse_bits() | 1,
            value: Some(value),
            tie_break: TIE_BREAKS.next(),
        }
    }

    pub(crate) fn is_dummy(&self) -> bool {
        self.value.is_none()
    }
}

impl<T: Clone> Clone for SplitEntry<T> {
    fn clone(&self) -> Self {
        Self {
            split_key: self.split_key,
            value: self.value.clone(),
            tie_break: self.tie_break,
        }
    }
}

impl<T: PartialEq> PartialEq for SplitEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.split_key == other.split_key && self.value == other.value
    }
}

impl<T: Eq> Eq for SplitEntry<T> {}

impl<T: PartialEq> PartialOrd for SplitEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Eq> Ord for SplitEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.split_key.cmp(&other.split_key) {
            Ordering::Equal if self.value == other.value => Ordering::Equal,
            Ordering::Equal => self.tie_break.cmp(&other.tie_break),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_key_has_low_bit_clear() {
        let d = SplitEntry::<()>::dummy(5);
        assert_eq!(d.split_key & 1, 0);
        assert!(d.is_dummy());
    }

    #[test]
    fn real_key_has_low_bit_set() {
        let e = SplitEntry::real(0xdead_beef, "x");
        assert_eq!(e.split_key & 1, 1);
        assert!(!e.is_dummy());
    }

    #[test]
    fn root_dummy_sorts_before_everything() {
        let root = SplitEntry::<()>::dummy(0);
        let real = SplitEntry::<()>::real(0, ());
        assert!(root < real);
    }

    #[test]
    fn same_hash_different_values_are_not_equal() {
        let a = SplitEntry::real(42, "a");
        let b = SplitEntry::real(42, "b");
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal);

        let probe_a = SplitEntry::probe(42, "a");
        assert_eq!(a, probe_a);
    }
}
