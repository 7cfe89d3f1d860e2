//! Property-based checks of the round-trip/idempotence laws from §8:
//! `add(x); remove(x)` must leave membership unchanged, for every
//! container that exposes that pair of operations.

use cbbs_collections::hashset::HashSet;
use cbbs_collections::list::OrderedSet;
use proptest::prelude::*;

proptest! {
    #[test]
    fn ordered_set_add_remove_round_trips(xs in prop::collection::vec(any::<i32>(), 0..64), probe in any::<i32>()) {
        let set = OrderedSet::new();
        for &x in &xs {
            set.insert(x);
        }
        let present_before = set.contains(&probe);

        let inserted = set.insert(probe);
        prop_assert!(set.contains(&probe));
        if inserted {
            prop_assert!(set.remove(&probe));
            prop_assert_eq!(set.contains(&probe), present_before);
        }
    }

    #[test]
    fn hash_set_add_remove_round_trips(xs in prop::collection::vec(any::<i32>(), 0..64), probe in any::<i32>()) {
        let set = HashSet::new();
        for &x in &xs {
            set.insert(x);
        }
        let present_before = set.contains(&probe);

        let inserted = set.insert(probe);
        prop_assert!(set.contains(&probe));
        if inserted {
            prop_assert!(set.remove(&probe));
            prop_assert_eq!(set.contains(&probe), present_before);
        }
    }

    #[test]
    fn ordered_set_stays_sorted_under_random_inserts_and_removes(
        ops in prop::collection::vec((any::<bool>(), any::<i16>()), 0..200)
    ) {
        let set = OrderedSet::new();
        for (is_insert, key) in ops {
            if is_insert {
                set.insert(key as i32);
            } else {
                set.remove(&(key as i32));
            }
        }
        let snapshot = set.iter().collect::<Vec<_>>();
        prop_assert!(snapshot.windows(2).all(|w| w[0] < w[1]));
    }
}
