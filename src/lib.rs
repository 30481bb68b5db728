//! Concurrent closed-addressing (chained) hash sets.
//!
//! This crate provides four implementations of the same membership contract
//! (add/remove/contains/size), differing only in how they synchronize access
//! across threads and how they coordinate resizing the bucket table:
//!
//! - [`SequentialSet`]: no synchronization, single-threaded baseline.
//! - [`CoarseSet`]: one global lock around the whole table.
//! - [`StripedSet`]: a fixed-size array of stripe locks, each guarding a
//!   disjoint subset of buckets; the bucket table grows independently of the
//!   stripe count.
//! - [`RefinableSet`]: the stripe array itself grows in lockstep with the
//!   bucket table, coordinated through an atomic owner token.
//!
//! All four share the [`Set`] trait. Pick the concrete type that matches your
//! contention profile at construction time; there is no trait-object variant
//! selection on the hot path.

#![deny(missing_docs)]

pub mod set;

pub use set::{CoarseSet, RefinableSet, Set, SequentialSet, StripedSet};
