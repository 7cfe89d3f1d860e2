use super::directory::Directory;
use super::entry::SplitEntry;
use crate::list::{Node, OrderedList};
use crossbeam::epoch::{self, Guard, Shared};
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Configuration for a [`HashSet`] (§6 "hash set" knobs).
#[derive(Debug, Clone, Copy)]
pub struct HashSetConfig {
    /// Expected number of elements, used to size the bucket directory's
    /// per-segment allocation.
    pub expected_size: usize,
    /// Resize threshold: growth is considered once `len > buckets * load_factor`.
    pub load_factor: f64,
    /// Number of top-level directory segments.
    pub segment_count: usize,
    /// Starting value of `bucket_bits` (live bucket count = `2^bucket_bits`).
    pub initial_bucket_bits: u32,
}

impl Default for HashSetConfig {
    fn default() -> Self {
        Self {
            expected_size: 500,
            load_factor: 0.75,
            segment_count: 512,
            initial_bucket_bits: 6,
        }
    }
}

fn highest_set_bit(b: u32) -> u32 {
    if b == 0 {
        0
    } else {
        1 << (31 - b.leading_zeros())
    }
}

fn hash32<T: Hash, S: BuildHasher>(value: &T, build: &S) -> u32 {
    let mut hasher = build.build_hasher();
    value.hash(&mut hasher);
    let h = hasher.finish();
    ((h >> 32) ^ h) as u32
}

/// A lock-free set built from a split-ordered [`OrderedList`] (§4.5).
///
/// `len` is a best-effort auxiliary counter (§1 "Non-goals"): it tracks
/// the set's size closely but is not itself a linearisation point.
pub struct HashSet<T, S = RandomState> {
    list: OrderedList<SplitEntry<T>>,
    directory: Directory<T>,
    bucket_bits: AtomicU32,
    len: AtomicUsize,
    load_factor: f64,
    hasher: S,
}

impl<T: Clone + Hash + Eq> HashSet<T, RandomState> {
    pub fn new() -> Self {
        Self::with_config(HashSetConfig::default())
    }

    pub fn with_config(config: HashSetConfig) -> Self {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<T: Clone + Hash + Eq> Default for HashSet<T, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Hash + Eq, S: BuildHasher> HashSet<T, S> {
    pub fn with_config_and_hasher(config: HashSetConfig, hasher: S) -> Self {
        let segment_size = ((config.expected_size as u32 / config.segment_count.max(1) as u32)
            .max(1))
        .next_power_of_two()
        .max(16);

        let set = Self {
            list: OrderedList::new(),
            directory: Directory::new(config.segment_count, segment_size as usize),
            bucket_bits: AtomicU32::new(config.initial_bucket_bits),
            len: AtomicUsize::new(0),
            load_factor: config.load_factor,
            hasher,
        };

        // Bucket 0 is always materialised eagerly: its dummy (split key 0)
        // is the true head of the list, and every other bucket's lazy
        // materialisation recurses toward it.
        let guard = epoch::pin();
        let dummy = set
            .list
            .find_or_insert(SplitEntry::dummy(0), &guard);
        set.directory.store(0, dummy, &guard);
        set
    }

    fn bucket_count(&self) -> u32 {
        1u32 << self.bucket_bits.load(Ordering::Relaxed).min(31)
    }

    fn bucket_for(&self, hash: u32) -> u32 {
        hash & (self.bucket_count() - 1)
    }

    /// Returns the dummy node for `bucket`, materialising it (and any
    /// unmaterialised ancestor) first if necessary (§4.5 "Bucket
    /// resolution").
    fn get_bucket<'g>(
        &'g self,
        bucket: u32,
        guard: &'g Guard,
    ) -> Shared<'g, Node<SplitEntry<T>>> {
        if let Some(existing) = self.directory.load(bucket, guard) {
            return existing;
        }
        self.initialize_bucket(bucket, guard)
    }

    fn initialize_bucket<'g>(
        &'g self,
        bucket: u32,
        guard: &'g Guard,
    ) -> Shared<'g, Node<SplitEntry<T>>> {
        if bucket != 0 {
            let parent = bucket ^ highest_set_bit(bucket);
            let parent_dummy = self.get_bucket(parent, guard);
            if let Some(existing) = self.directory.load(bucket, guard) {
                return existing;
            }
            let parent_node = unsafe { parent_dummy.deref() };
            let dummy = self.list.find_or_insert_from(
                &parent_node.next,
                SplitEntry::dummy(bucket),
                guard,
            );
            self.directory.store(bucket, dummy, guard);
            dummy
        } else if let Some(existing) = self.directory.load(0, guard) {
            existing
        } else {
            let dummy = self.list.find_or_insert(SplitEntry::dummy(0), guard);
            self.directory.store(0, dummy, guard);
            dummy
        }
    }

    /// Grows `bucket_bits` by one if the load factor is exceeded and the
    /// directory has the address space for it. Best-effort: a lost CAS
    /// race just means another thread already grew it.
    fn maybe_grow(&self, len: usize) {
        let bits = self.bucket_bits.load(Ordering::Relaxed);
        let buckets = 1u64 << bits;
        if (len as f64) <= (buckets as f64) * self.load_factor {
            return;
        }
        if (1u64 << (bits + 1)) as u32 > self.directory.capacity() {
            return;
        }
        let _ = self.bucket_bits.compare_exchange(
            bits,
            bits + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Inserts `value`. Returns `false` if an equal value (by hash) was
    /// already present.
    pub fn insert(&self, value: T) -> bool {
        let guard = epoch::pin();
        let hash = hash32(&value, &self.hasher);
        let bucket = self.bucket_for(hash);
        let dummy = self.get_bucket(bucket, &guard);
        let dummy_node = unsafe { dummy.deref() };
        let inserted =
            self.list
                .insert_from(&dummy_node.next, SplitEntry::real(hash, value), &guard);
        if inserted {
            let len = self.len.fetch_add(1, Ordering::Relaxed) + 1;
            self.maybe_grow(len);
        }
        inserted
    }

    /// Removes `value`. Returns `false` if it was not present.
    pub fn remove(&self, value: &T) -> bool {
        let guard = epoch::pin();
        let hash = hash32(value, &self.hasher);
        let bucket = self.bucket_for(hash);
        let dummy = self.get_bucket(bucket, &guard);
        let dummy_node = unsafe { dummy.deref() };
        let probe = SplitEntry::probe(hash, value.clone());
        let removed = self.list.remove_from(&dummy_node.next, &probe, &guard);
        if removed {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Wait-free membership test.
    pub fn contains(&self, value: &T) -> bool {
        let guard = epoch::pin();
        let hash = hash32(value, &self.hasher);
        let bucket = self.bucket_for(hash);
        let dummy = self.get_bucket(bucket, &guard);
        let dummy_node = unsafe { dummy.deref() };
        let probe = SplitEntry::probe(hash, value.clone());
        self.list.contains_from(&dummy_node.next, &probe, &guard)
    }

    /// Best-effort size (§1 "Non-goals": not itself a linearisation point).
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A weakly-consistent snapshot of the set's members, dummies filtered
    /// out, in split-ordered (not insertion or value) order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.list
            .snapshot_keys()
            .into_iter()
            .filter(|entry| !entry.is_dummy())
            .filter_map(|entry| entry.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn basic_insert_remove_contains() {
        let set: HashSet<i32> = HashSet::new();
        assert!(set.insert(1));
        assert!(!set.insert(1));
        assert!(set.contains(&1));
        assert_eq!(set.len(), 1);

        assert!(set.remove(&1));
        assert!(!set.remove(&1));
        assert!(!set.contains(&1));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn grows_past_the_initial_bucket_count() {
        let config = HashSetConfig {
            expected_size: 64,
            load_factor: 0.75,
            segment_count: 8,
            initial_bucket_bits: 2,
        };
        let set: HashSet<i32> = HashSet::with_config(config);
        for i in 0..200 {
            assert!(set.insert(i));
        }
        assert_eq!(set.len(), 200);
        for i in 0..200 {
            assert!(set.contains(&i), "missing {i}");
        }
        let mut seen: Vec<i32> = set.iter().collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 200);
    }

    #[test]
    fn four_threads_inserting_disjoint_ranges_all_land() {
        let set = Arc::new(HashSet::<i32>::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    for i in t * 1000..t * 1000 + 1000 {
                        assert!(set.insert(i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(set.len(), 4000);
        for t in 0..4 {
            for i in t * 1000..t * 1000 + 1000 {
                assert!(set.contains(&i), "missing {i}");
            }
        }
    }

    /// A hasher that collapses every key to the same hash, forcing every
    /// insert into one bucket's run of same-split-key entries. Exercises
    /// the disambiguation `SplitEntry` does on the actual value, rather
    /// than relying on SipHash happening to avoid collisions.
    #[derive(Default, Clone)]
    struct ConstantHasher;

    impl Hasher for ConstantHasher {
        fn finish(&self) -> u64 {
            0
        }
        fn write(&mut self, _bytes: &[u8]) {}
    }

    impl BuildHasher for ConstantHasher {
        type Hasher = ConstantHasher;
        fn build_hasher(&self) -> ConstantHasher {
            ConstantHasher
        }
    }

    #[test]
    fn colliding_hashes_do_not_conflate_distinct_values() {
        let set: HashSet<i32, ConstantHasher> =
            HashSet::with_config_and_hasher(HashSetConfig::default(), ConstantHasher);

        assert!(set.insert(1));
        assert!(set.insert(2));
        assert!(set.insert(3));
        assert!(!set.insert(2)); // true duplicate still rejected

        assert!(set.contains(&1));
        assert!(set.contains(&2));
        assert!(set.contains(&3));
        assert!(!set.contains(&4));
        assert_eq!(set.len(), 3);

        assert!(set.remove(&2));
        assert!(!set.contains(&2));
        assert!(set.contains(&1));
        assert!(set.contains(&3));
        assert_eq!(set.len(), 2);
    }
}
