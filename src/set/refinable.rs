//! The stripe array grows in lockstep with the bucket table, coordinated
//! through an atomic owner token rather than a fixed stripe count.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crossbeam::atomic::AtomicCell;
use crossbeam::utils::CachePadded;
use log::{debug, trace};

use super::{assert_valid_capacity, hash_of, should_resize, Set, DEFAULT_CAPACITY};

/// One generation of the unified stripe-and-bucket array: each slot is both
/// the lock and the data it protects, so a resize that replaces the
/// generation trivially keeps the two arrays' lengths equal (invariant 5).
struct Generation<T> {
    slots: Vec<Mutex<Vec<T>>>,
}

impl<T> Generation<T> {
    fn new(capacity: usize) -> Self {
        Generation {
            slots: (0..capacity).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// A hash set whose stripe array grows with the bucket table.
///
/// Unlike [`StripedSet`](super::StripedSet), where the stripe count is fixed
/// at construction, `RefinableSet` replaces its entire stripe-and-bucket
/// generation on resize. This requires coordinating two things that a fixed
/// stripe count makes trivial: which generation a lock belongs to, and
/// whether a resize is currently in flight. Both are handled by an **owner
/// token** (`AtomicCell<Option<ThreadId>>`) and an optimistic
/// acquire-then-validate protocol on every operation.
pub struct RefinableSet<T, S = RandomState> {
    generation: Mutex<Arc<Generation<T>>>,
    owner: AtomicCell<Option<ThreadId>>,
    len: CachePadded<AtomicUsize>,
    hasher: S,
}

impl<T> Default for RefinableSet<T>
where
    T: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RefinableSet<T>
where
    T: Hash + Eq,
{
    /// Creates a new set with the default initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a new set with the given initial capacity. The stripe array
    /// starts at this same size and grows with the bucket table.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::default())
    }
}

impl<T, S> RefinableSet<T, S>
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
        RefinableSet {
            generation: Mutex::new(Arc::new(Generation::new(capacity))),
            owner: AtomicCell::new(None),
            len: CachePadded::new(AtomicUsize::new(0)),
            hasher,
        }
    }

    fn snapshot(&self) -> Arc<Generation<T>> {
        Arc::clone(&self.generation.lock().unwrap())
    }

    /// Spins while a resize owned by another thread is in progress.
    fn spin_until_no_foreign_owner(&self, self_id: ThreadId) {
        while let Some(owner) = self.owner.load() {
            if owner == self_id {
                break;
            }
            thread::yield_now();
        }
    }

    /// Runs `f` against the bucket owning `elem`, implementing the full
    /// optimistic acquire-then-validate-then-retry protocol: lock the
    /// snapshotted generation's slot first, then confirm no resize raced
    /// ahead of the lock before trusting it, retrying from the top if one did.
    /// Returns `f`'s result alongside the bucket-array length observed at
    /// the moment the stripe was validated, for the caller's resize check.
    fn with_acquired_slot<R>(&self, hash: u64, f: impl FnOnce(&mut Vec<T>) -> R) -> (R, usize) {
        let self_id = thread::current().id();
        loop {
            self.spin_until_no_foreign_owner(self_id);

            let generation = self.snapshot();
            let idx = (hash as usize) % generation.len();
            trace!("refinable: locking slot {} of snapshotted generation", idx);
            let mut guard = generation.slots[idx].lock().unwrap();

            let owner_now = self.owner.load();
            let foreign_owner = matches!(owner_now, Some(t) if t != self_id);
            let current_generation = self.snapshot();
            if foreign_owner || !Arc::ptr_eq(&current_generation, &generation) {
                trace!("refinable: validation failed, retrying acquire");
                drop(guard);
                continue;
            }

            let capacity = generation.len();
            let result = f(&mut guard);
            return (result, capacity);
        }
    }

    /// Attempts to win the resize-owner CAS and grow the table. Returns
    /// immediately if another thread already owns the resize or has already
    /// completed it.
    fn resize(&self, observed_capacity: usize) {
        let self_id = thread::current().id();
        if self.owner.compare_exchange(None, Some(self_id)).is_err() {
            debug!("refinable resize: lost owner-token CAS, another thread is resizing");
            return;
        }

        let generation = self.snapshot();
        if generation.len() != observed_capacity {
            debug!(
                "refinable resize skipped: capacity already advanced to {}",
                generation.len()
            );
            self.owner.store(None);
            return;
        }

        let new_capacity = observed_capacity * 2;
        debug!(
            "refinable resize starting: {} -> {}",
            observed_capacity, new_capacity
        );

        let mut new_slots: Vec<Mutex<Vec<T>>> =
            (0..new_capacity).map(|_| Mutex::new(Vec::new())).collect();
        for slot in &generation.slots {
            // Locking each slot quiesces any in-flight holder; any thread
            // now entering the acquire loop observes the owner token and
            // spins instead of acquiring here.
            let mut bucket = slot.lock().unwrap();
            for elem in bucket.drain(..) {
                let idx = (hash_of(&self.hasher, &elem) as usize) % new_capacity;
                new_slots[idx]
                    .get_mut()
                    .expect("uncontended during construction")
                    .push(elem);
            }
        }

        *self.generation.lock().unwrap() = Arc::new(Generation { slots: new_slots });
        debug!("refinable resize complete: capacity now {}", new_capacity);
        self.owner.store(None);
    }
}

impl<T, S> Set for RefinableSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Elem = T;

    fn add(&self, elem: T) -> bool {
        let hash = hash_of(&self.hasher, &elem);
        let (inserted, capacity) = self.with_acquired_slot(hash, move |bucket| {
            if bucket.contains(&elem) {
                false
            } else {
                bucket.push(elem);
                true
            }
        });
        if inserted {
            let new_len = self.len.fetch_add(1, Ordering::SeqCst) + 1;
            if should_resize(new_len, capacity) {
                self.resize(capacity);
            }
        }
        inserted
    }

    fn remove(&self, elem: &T) -> bool {
        let hash = hash_of(&self.hasher, elem);
        let (removed, _capacity) = self.with_acquired_slot(hash, |bucket| {
            if let Some(pos) = bucket.iter().position(|e| e == elem) {
                bucket.swap_remove(pos);
                true
            } else {
                false
            }
        });
        if removed {
            self.len.fetch_sub(1, Ordering::SeqCst);
        }
        removed
    }

    fn contains(&self, elem: &T) -> bool {
        let hash = hash_of(&self.hasher, elem);
        let (found, _capacity) = self.with_acquired_slot(hash, |bucket| bucket.contains(elem));
        found
    }

    /// Returns an atomically loaded snapshot of the element count.
    ///
    /// As with [`StripedSet`](super::StripedSet), this is a weak guarantee:
    /// accurate at some recent instant, not read under any bucket lock.
    fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }
}
