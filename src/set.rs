//! The public, typed surface: a `Set<T>` over arbitrary hashable values,
//! backed by the `i64`-keyed tree in `tree.rs`.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};

use crate::tree::Tree;

/// A non-blocking set supporting concurrent `add`, `remove`, and `contains`
/// from any number of threads without locks, plus an eventually-consistent
/// [`Set::len`] backed by lazily propagated subtree summaries.
///
/// Values are mapped to `i64` keys by hashing (`S: BuildHasher`), the same
/// approach `michael_hash_map`'s bucket indexing takes: the set does not
/// store `T` itself, only its hash, so two values that hash identically are
/// indistinguishable to it.
pub struct Set<T, S = RandomState> {
    tree: Tree,
    hash_builder: S,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T: Hash> Set<T, RandomState> {
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<T: Hash> Default for Set<T, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash, S: BuildHasher> Set<T, S> {
    pub fn with_hasher(hash_builder: S) -> Self {
        Set {
            tree: Tree::new(),
            hash_builder,
            _marker: std::marker::PhantomData,
        }
    }

    fn key_of(&self, value: &T) -> i64 {
        let mut hasher = self.hash_builder.build_hasher();
        value.hash(&mut hasher);
        hasher.finish() as i64
    }

    /// Returns whether `value` is currently a member. Wait-free: a single
    /// root-to-leaf descent with no retries.
    pub fn contains(&self, value: &T) -> bool {
        let guard = &crossbeam_epoch::pin();
        self.tree.contains(self.key_of(value), guard)
    }

    /// Inserts `value`, returning `true` if it was not already present.
    pub fn add(&self, value: &T) -> bool {
        let guard = &crossbeam_epoch::pin();
        self.tree.insert(self.key_of(value), guard)
    }

    /// Removes `value`, returning `true` if it was present.
    pub fn remove(&self, value: &T) -> bool {
        let guard = &crossbeam_epoch::pin();
        self.tree.remove(self.key_of(value), guard)
    }

    /// The root's lazily propagated member count. May lag behind a
    /// concurrently running `add`/`remove` by the in-flight operations that
    /// have not yet reached `Propagate`.
    pub fn len(&self) -> usize {
        let guard = &crossbeam_epoch::pin();
        self.tree.size(guard)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_utils::thread;
    use rand::prelude::*;

    #[test]
    fn add_contains_remove_single_threaded() {
        let set = Set::new();
        assert!(!set.contains(&1));
        assert!(set.add(&1));
        assert!(set.contains(&1));
        assert!(!set.add(&1));
        assert!(set.remove(&1));
        assert!(!set.contains(&1));
        assert!(!set.remove(&1));
    }

    #[test]
    fn len_tracks_distinct_additions() {
        let set = Set::new();
        for i in 0..50 {
            set.add(&i);
        }
        assert_eq!(set.len(), 50);
        for i in 0..25 {
            set.remove(&i);
        }
        assert_eq!(set.len(), 25);
    }

    #[test]
    fn concurrent_disjoint_adds_are_all_visible() {
        let set = Set::new();
        thread::scope(|scope| {
            scope.spawn(|_| {
                for i in 0..500 {
                    set.add(&i);
                }
            });
            scope.spawn(|_| {
                for i in 500..1000 {
                    set.add(&i);
                }
            });
        })
        .unwrap();

        for i in 0..1000 {
            assert!(set.contains(&i));
        }
        assert_eq!(set.len(), 1000);
    }

    #[test]
    fn concurrent_add_and_remove_on_overlapping_keys_stay_bounded() {
        let set = Set::new();
        let keys: Vec<i32> = (0..200).collect();

        thread::scope(|scope| {
            scope.spawn(|_| {
                let mut rng = rand::thread_rng();
                let mut ks = keys.clone();
                ks.shuffle(&mut rng);
                for k in ks {
                    set.add(&k);
                }
            });
            scope.spawn(|_| {
                let mut rng = rand::thread_rng();
                let mut ks = keys.clone();
                ks.shuffle(&mut rng);
                for k in ks {
                    set.remove(&k);
                }
            });
        })
        .unwrap();

        assert!(set.len() <= keys.len());
    }

    #[test]
    fn quiescent_len_matches_true_membership() {
        let set = Set::new();
        let mut rng = rand::thread_rng();
        let mut keys: Vec<i32> = (0..300).collect();
        keys.shuffle(&mut rng);
        for k in &keys {
            set.add(k);
        }
        let mut removed = 0;
        for k in keys.iter().take(100) {
            set.remove(k);
            removed += 1;
        }
        assert_eq!(set.len(), keys.len() - removed);
    }
}
