//! A fixed array of stripe locks, each guarding a disjoint subset of bucket
//! positions; the bucket table grows independently of the stripe count.

use std::cell::UnsafeCell;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam::utils::CachePadded;
use log::{debug, trace};

use super::{assert_valid_capacity, hash_of, should_resize, Set, DEFAULT_CAPACITY};

/// One generation of the bucket array. Stripe mutexes serialize access to
/// disjoint index ranges within it; the generation itself is swapped as a
/// whole by `resize`.
struct BucketTable<T> {
    buckets: Vec<UnsafeCell<Vec<T>>>,
}

// SAFETY: every access to a `BucketTable` bucket in this module happens
// while the caller holds the stripe mutex that owns that bucket's index
// (`index mod stripe_count`), which serializes all mutation and observation
// of a given bucket across threads. The stripe lock, not `Sync`, is what
// makes concurrent access sound.
unsafe impl<T: Send> Sync for BucketTable<T> {}

impl<T> BucketTable<T> {
    fn new(capacity: usize) -> Self {
        BucketTable {
            buckets: (0..capacity).map(|_| UnsafeCell::new(Vec::new())).collect(),
        }
    }

    fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// # Safety
    ///
    /// The caller must hold the stripe lock guarding `index`.
    unsafe fn bucket(&self, index: usize) -> &mut Vec<T> {
        &mut *self.buckets[index].get()
    }
}

/// A hash set with a fixed array of stripe locks, independent of the bucket
/// table's size.
///
/// The stripe count `S` is chosen at construction and never changes; the
/// bucket table grows (doubling) as load factor demands. Because every
/// concrete bucket count is `S · 2^k`, the stripe owning element `e` is
/// always `hash(e) mod S`, computable without reading the current bucket
/// count (see the crate's design notes for the divisibility argument).
pub struct StripedSet<T, S = RandomState> {
    stripes: Vec<Mutex<()>>,
    table: Mutex<Arc<BucketTable<T>>>,
    len: CachePadded<AtomicUsize>,
    hasher: S,
}

impl<T> Default for StripedSet<T>
where
    T: Hash + Eq + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StripedSet<T>
where
    T: Hash + Eq + Send,
{
    /// Creates a new set with the default initial capacity and stripe count.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a new set with the given initial capacity. The stripe count
    /// is fixed to this same value for the lifetime of the set.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::default())
    }
}

impl<T, S> StripedSet<T, S>
where
    T: Hash + Eq + Send,
    S: BuildHasher,
{
    /// Creates a new set with the default initial capacity and the given
    /// hash provider.
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hasher)
    }

    /// Creates a new set with the given initial capacity, hash provider, and
    /// stripe count (fixed at `capacity`).
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        assert_valid_capacity(capacity);
        StripedSet {
            stripes: (0..capacity).map(|_| Mutex::new(())).collect(),
            table: Mutex::new(Arc::new(BucketTable::new(capacity))),
            len: CachePadded::new(AtomicUsize::new(0)),
            hasher,
        }
    }

    fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_index(&self, elem: &T) -> usize {
        (hash_of(&self.hasher, elem) as usize) % self.stripe_count()
    }

    fn snapshot(&self) -> Arc<BucketTable<T>> {
        Arc::clone(&self.table.lock().unwrap())
    }

    /// Acquires all stripes in ascending order, rehashes into a fresh
    /// generation if `observed_capacity` is still current, then releases in
    /// descending order.
    fn resize(&self, observed_capacity: usize) {
        let mut guards: Vec<MutexGuard<'_, ()>> = Vec::with_capacity(self.stripe_count());
        for stripe in &self.stripes {
            trace!("striped resize: acquiring stripe {}", guards.len());
            guards.push(stripe.lock().unwrap());
        }

        let mut table_guard = self.table.lock().unwrap();
        if table_guard.capacity() != observed_capacity {
            debug!(
                "striped resize skipped: capacity already advanced to {}",
                table_guard.capacity()
            );
            drop(table_guard);
            while guards.pop().is_some() {}
            return;
        }

        let new_capacity = observed_capacity * 2;
        debug!(
            "striped resize starting: {} -> {}",
            observed_capacity, new_capacity
        );
        let new_table = BucketTable::new(new_capacity);
        for idx in 0..table_guard.capacity() {
            // SAFETY: every stripe is held by this thread for the duration
            // of the resize, so no concurrent operation can observe or
            // mutate any bucket in the old generation.
            let old_bucket = unsafe { table_guard.bucket(idx) };
            for elem in old_bucket.drain(..) {
                let new_idx = (hash_of(&self.hasher, &elem) as usize) % new_capacity;
                // SAFETY: same as above, exclusive access via held stripes.
                unsafe { new_table.bucket(new_idx) }.push(elem);
            }
        }
        *table_guard = Arc::new(new_table);
        debug!("striped resize complete: capacity now {}", new_capacity);

        drop(table_guard);
        while guards.pop().is_some() {}
    }
}

impl<T, S> Set for StripedSet<T, S>
where
    T: Hash + Eq + Send,
    S: BuildHasher,
{
    type Elem = T;

    fn add(&self, elem: T) -> bool {
        let stripe_idx = self.stripe_index(&elem);
        let (inserted, observed_capacity) = {
            trace!("striped: acquiring stripe {} for add", stripe_idx);
            let _guard = self.stripes[stripe_idx].lock().unwrap();
            let generation = self.snapshot();
            let capacity = generation.capacity();
            let bucket_idx = (hash_of(&self.hasher, &elem) as usize) % capacity;
            // SAFETY: `_guard` holds the stripe owning `bucket_idx`, since
            // `stripe_idx == bucket_idx mod stripe_count` by construction.
            let bucket = unsafe { generation.bucket(bucket_idx) };
            let inserted = if bucket.contains(&elem) {
                false
            } else {
                bucket.push(elem);
                true
            };
            (inserted, capacity)
        };
        if inserted {
            let new_len = self.len.fetch_add(1, Ordering::SeqCst) + 1;
            if should_resize(new_len, observed_capacity) {
                self.resize(observed_capacity);
            }
        }
        inserted
    }

    fn remove(&self, elem: &T) -> bool {
        let stripe_idx = self.stripe_index(elem);
        trace!("striped: acquiring stripe {} for remove", stripe_idx);
        let _guard = self.stripes[stripe_idx].lock().unwrap();
        let generation = self.snapshot();
        let bucket_idx = (hash_of(&self.hasher, elem) as usize) % generation.capacity();
        // SAFETY: see `add`.
        let bucket = unsafe { generation.bucket(bucket_idx) };
        if let Some(pos) = bucket.iter().position(|e| e == elem) {
            bucket.swap_remove(pos);
            self.len.fetch_sub(1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    fn contains(&self, elem: &T) -> bool {
        let stripe_idx = self.stripe_index(elem);
        trace!("striped: acquiring stripe {} for contains", stripe_idx);
        let _guard = self.stripes[stripe_idx].lock().unwrap();
        let generation = self.snapshot();
        let bucket_idx = (hash_of(&self.hasher, elem) as usize) % generation.capacity();
        // SAFETY: see `add`.
        unsafe { generation.bucket(bucket_idx) }.contains(elem)
    }

    /// Returns an atomically loaded snapshot of the element count.
    ///
    /// This is the weak guarantee documented in the crate's design notes:
    /// the value was exact at some recent instant, but is not read under
    /// any stripe and so is not a linearization-point quantity the way
    /// [`crate::SequentialSet::len`] and [`crate::CoarseSet::len`] are.
    fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract_tests::ConstantHasher;
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn basic_scenario() {
        let set: StripedSet<i32> = StripedSet::with_capacity(4);
        assert!(set.add(1));
        assert!(!set.add(1));
        assert!(set.contains(&1));
        assert!(set.remove(&1));
        assert!(!set.contains(&1));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn resize_trigger() {
        let set: StripedSet<i32> = StripedSet::with_capacity(1);
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
        let set: StripedSet<i32, ConstantHasher> =
            StripedSet::with_capacity_and_hasher(4, ConstantHasher);
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
        let set = Arc::new(StripedSet::<i32>::with_capacity(4));
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
    fn resize_race_doubles_exactly_once_per_threshold() {
        let set = Arc::new(StripedSet::<i32>::with_capacity(2));
        let handles: Vec<_> = (0..2)
            .map(|t| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    for i in 0..20 {
                        set.add(t * 20 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(set.len(), 40);
        for v in 0..40 {
            assert!(set.contains(&v));
        }
    }
}
