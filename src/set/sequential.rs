//! Single-threaded baseline: no synchronization of any kind. Serves as the
//! correctness reference the concurrent variants are checked against.

use std::cell::RefCell;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};

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

/// A hash set with no internal synchronization.
///
/// This is the correctness reference for the concurrent variants in this
/// crate: it implements the same [`Set`] contract with a plain bucket-chain
/// table and no locking whatsoever. It is deliberately **not** [`Sync`] (its
/// state lives behind a [`RefCell`]), so the type system, not just this doc
/// comment, rejects attempts to share it across threads.
pub struct SequentialSet<T, S = RandomState> {
    inner: RefCell<Table<T>>,
    hasher: S,
}

impl<T> Default for SequentialSet<T>
where
    T: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SequentialSet<T>
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

impl<T, S> SequentialSet<T, S>
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
        SequentialSet {
            inner: RefCell::new(Table::new(capacity)),
            hasher,
        }
    }

    fn bucket_index(&self, capacity: usize, elem: &T) -> usize {
        (hash_of(&self.hasher, elem) as usize) % capacity
    }

    /// Doubles the bucket count and rehashes every element, preserving the
    /// multiset of present elements.
    fn resize(&self) {
        let mut table = self.inner.borrow_mut();
        let new_capacity = table.capacity() * 2;
        let mut new_buckets: Vec<Vec<T>> = (0..new_capacity).map(|_| Vec::new()).collect();
        for bucket in table.buckets.drain(..) {
            for elem in bucket {
                let idx = (hash_of(&self.hasher, &elem) as usize) % new_capacity;
                new_buckets[idx].push(elem);
            }
        }
        table.buckets = new_buckets;
    }
}

impl<T, S> Set for SequentialSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type Elem = T;

    fn add(&self, elem: T) -> bool {
        let capacity = self.inner.borrow().capacity();
        let idx = self.bucket_index(capacity, &elem);
        let inserted = {
            let mut table = self.inner.borrow_mut();
            let bucket = &mut table.buckets[idx];
            if bucket.contains(&elem) {
                false
            } else {
                bucket.push(elem);
                table.len += 1;
                true
            }
        };
        if inserted && should_resize(self.inner.borrow().len, capacity) {
            self.resize();
        }
        inserted
    }

    fn remove(&self, elem: &T) -> bool {
        let mut table = self.inner.borrow_mut();
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
        let table = self.inner.borrow();
        let idx = (hash_of(&self.hasher, elem) as usize) % table.capacity();
        table.buckets[idx].contains(elem)
    }

    fn len(&self) -> usize {
        self.inner.borrow().len
    }
}
