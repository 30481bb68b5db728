//! One global lock protects the whole table.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::RwLock;

use log::{debug, trace};

use super::{assert_valid_capacity, hash_of, should_resize, Set, DEFAULT_CAPACITY};

struct Table<T> {
    buckets: Vec<Vec<T>>,
    len: usize,
}

impl<T> Table<T> {
    fn new(capacity: usize) -> Self {
        Table {
            buckets: (0..capacity).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buckets.len()
    }
}

/// A hash set guarded by a single global lock.
///
/// Every operation, including resize, runs under one [`RwLock`]. Reads
/// (`contains`, `len`) take the shared side; mutations take the exclusive
/// side. This is the simplest concurrency-safe variant and the one with the
/// least available parallelism.
pub struct CoarseSet<T, S = RandomState> {
    inner: RwLock<Table<T>>,
    hasher: S,
}

impl<T> Default for CoarseSet<T>
where
    T: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CoarseSet<T>
where
    T: Hash + Eq,
{
    /// Creates a new set with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a new set with the given initial capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::default())
    }
}

impl<T, S> CoarseSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a new set with the default initial capacity and the given
    /// hash provider.
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hasher)
    }

    /// Creates a new set with the given initial capacity and hash provider.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        assert_valid_capacity(capacity);
        CoarseSet {
            inner: RwLock::new(Table::new(capacity)),
            hasher,
        }
    }

    /// Doubles the bucket count and rehashes every element, assuming the
    /// caller still believes `observed_capacity` to be current. Re-checks
    /// under the write lock before doing any work, so a thread that lost a
    /// race to resize first does not redundantly rehash.
    fn resize(&self, observed_capacity: usize) {
        let mut table = self.inner.write().unwrap();
        if table.capacity() != observed_capacity {
            debug!(
                "coarse resize skipped: capacity already advanced to {}",
                table.capacity()
            );
            return;
        }
        let new_capacity = table.capacity() * 2;
        debug!(
            "coarse resize starting: {} -> {}",
            observed_capacity, new_capacity
        );
        let mut new_buckets: Vec<Vec<T>> = (0..new_capacity).map(|_| Vec::new()).collect();
        for bucket in table.buckets.drain(..) {
            for elem in bucket {
                let idx = (hash_of(&self.hasher, &elem) as usize) % new_capacity;
                new_buckets[idx].push(elem);
            }
        }
        table.buckets = new_buckets;
        debug!("coarse resize complete: capacity now {}", new_capacity);
    }
}

impl<T, S> Set for CoarseSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Elem = T;

    fn add(&self, elem: T) -> bool {
        let (inserted, capacity, len) = {
            trace!("coarse: acquiring write lock for add");
            let mut table = self.inner.write().unwrap();
            let capacity = table.capacity();
            let idx = (hash_of(&self.hasher, &elem) as usize) % capacity;
            let bucket = &mut table.buckets[idx];
            let inserted = if bucket.contains(&elem) {
                false
            } else {
                bucket.push(elem);
                table.len += 1;
                true
            };
            (inserted, capacity, table.len)
        };
        if inserted && should_resize(len, capacity) {
            self.resize(capacity);
        }
        inserted
    }

    fn remove(&self, elem: &T) -> bool {
        trace!("coarse: acquiring write lock for remove");
        let mut table = self.inner.write().unwrap();
        let capacity = table.capacity();
        let idx = (hash_of(&self.hasher, elem) as usize) % capacity;
        let bucket = &mut table.buckets[idx];
        if let Some(pos) = bucket.iter().position(|e| e == elem) {
            bucket.swap_remove(pos);
            table.len -= 1;
            true
        } else {
            false
        }
    }

    fn contains(&self, elem: &T) -> bool {
        trace!("coarse: acquiring read lock for contains");
        let table = self.inner.read().unwrap();
        let idx = (hash_of(&self.hasher, elem) as usize) % table.capacity();
        table.buckets[idx].contains(elem)
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap().len
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract_tests::ConstantHasher;
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn basic_scenario() {
        let set: CoarseSet<i32> = CoarseSet::with_capacity(4);
        assert!(set.add(1));
        assert!(!set.add(1));
        assert!(set.contains(&1));
        assert!(set.remove(&1));
        assert!(!set.contains(&1));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn resize_trigger() {
        let set: CoarseSet<i32> = CoarseSet::with_capacity(1);
        for i in 0..5 {
            set.add(i);
        }
        for i in 0..5 {
            assert!(set.contains(&i));
        }
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn collision_chain() {
        let set: CoarseSet<i32, ConstantHasher> =
            CoarseSet::with_capacity_and_hasher(4, ConstantHasher);
        for i in 0..100 {
            set.add(i);
        }
        for i in 0..100 {
            assert!(set.contains(&i));
        }
        assert_eq!(set.len(), 100);
    }

    #[test]
    fn concurrent_disjoint_insert() {
        let set = Arc::new(CoarseSet::<i32>::with_capacity(4));
        let threads_n = 8;
        let per_thread = 200;
        let handles: Vec<_> = (0..threads_n)
            .map(|t| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    for i in 0..per_thread {
                        set.add(t * per_thread + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(set.len(), threads_n * per_thread);
        for v in 0..(threads_n * per_thread) {
            assert!(set.contains(&v));
        }
    }

    #[test]
    fn round_trip_laws() {
        let set: CoarseSet<i32> = CoarseSet::with_capacity(4);
        assert!(set.add(9));
        assert!(set.remove(&9));
        assert!(!set.contains(&9));
        assert_eq!((set.add(2), set.add(2)), (true, false));
        assert_eq!((set.remove(&100), set.remove(&100)), (false, false));
    }

    #[test]
    fn resize_and_contention_logging_paths_run_cleanly() {
        let _ = env_logger::try_init();
        let set = Arc::new(CoarseSet::<i32>::with_capacity(1));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    for i in 0..50 {
                        set.add(t * 50 + i);
                        let _ = set.contains(&(t * 50 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(set.len(), 200);
    }

    #[quickcheck]
    fn matches_std_hashset(ops: Vec<(bool, u16)>) -> bool {
        let set: CoarseSet<u16> = CoarseSet::new();
        let mut model = std::collections::HashSet::new();
        for (is_add, val) in ops {
            if is_add {
                assert_eq!(set.add(val), model.insert(val));
            } else {
                assert_eq!(set.remove(&val), model.remove(&val));
            }
        }
        set.len() == model.len() && model.iter().all(|v| set.contains(v))
    }
}
