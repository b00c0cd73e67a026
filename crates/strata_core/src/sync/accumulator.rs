//! # Per-Worker Accumulators
//!
//! Contention-free aggregation: every worker owns one cache-line-aligned
//! slot, the main thread merges all slots after the join.
//!
//! This module requires unsafe code: slots are written through `&self`.
//!
//! ## Layout
//!
//! ```text
//! ┌──────── 64 B ────────┐┌──────── 64 B ────────┐┌──────── 64 B ────────┐
//! │ worker 0 slot        ││ worker 1 slot        ││ worker 2 slot        │
//! └──────────────────────┘└──────────────────────┘└──────────────────────┘
//! ```
//!
//! ## Soundness
//!
//! - Writes need a [`WorkerContext`], which only pool workers hold. It is
//!   neither `Send` nor `Sync`, so slot `i` is only ever written from the
//!   thread of worker `i`.
//! - The context and the accumulator record the pool they belong to; writes
//!   from another pool's worker panic.
//! - Write paths never run caller code while a slot is borrowed.
//! - Shared reads are `unsafe`: the caller promises every job that could
//!   write has completed.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::marker::PhantomData;

use super::jobs::JobPool;

/// Identity of the worker running a job.
///
/// Only created by the pool, one per worker thread.
pub struct WorkerContext {
    pool: u64,
    index: usize,
    _thread_bound: PhantomData<*const ()>,
}

impl WorkerContext {
    pub(crate) const fn new(pool: u64, index: usize) -> Self {
        Self {
            pool,
            index,
            _thread_bound: PhantomData,
        }
    }

    /// Index of this worker in `0..pool.worker_count()`.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("pool", &self.pool)
            .field("index", &self.index)
            .finish()
    }
}

#[repr(align(64))]
struct Slot<T>(UnsafeCell<T>);

/// One padded value per worker of a pool.
pub struct PerWorker<T> {
    pool: u64,
    slots: Box<[Slot<T>]>,
}

// SAFETY: a slot is written only by the worker owning the matching
// `WorkerContext` (see module docs); shared reads are `unsafe` and require
// all writers to have completed.
unsafe impl<T: Send> Sync for PerWorker<T> {}

impl<T> PerWorker<T> {
    /// Creates one slot per worker of `pool`.
    #[must_use]
    pub fn new(pool: &JobPool, mut init: impl FnMut() -> T) -> Self {
        let slots = (0..pool.worker_count())
            .map(|_| Slot(UnsafeCell::new(init())))
            .collect();
        Self {
            pool: pool.id(),
            slots,
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if there are no slots.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Applies a crate-internal update to the caller's slot.
    ///
    /// `update` must not reach back into this accumulator.
    #[inline]
    fn with_slot<R>(&self, ctx: &WorkerContext, update: impl FnOnce(&mut T) -> R) -> R {
        assert_eq!(ctx.pool, self.pool, "accumulator used from a foreign job pool");
        let slot = &self.slots[ctx.index];
        // SAFETY: `ctx` is confined to worker `ctx.index` of this pool, so no
        // other thread writes this slot, and `update` does not re-enter.
        update(unsafe { &mut *slot.0.get() })
    }

    /// Replaces the caller's slot value and returns the old one.
    pub fn replace(&self, ctx: &WorkerContext, value: T) -> T {
        self.with_slot(ctx, |slot| std::mem::replace(slot, value))
    }

    /// Iterates the slots through a shared reference.
    ///
    /// # Safety
    ///
    /// No job that can write to this accumulator may still be running,
    /// i.e. every such job's handle has been waited on.
    pub unsafe fn iter_unsynchronized(&self) -> impl Iterator<Item = &T> {
        // SAFETY: guaranteed by the caller.
        self.slots.iter().map(|slot| unsafe { &*slot.0.get() })
    }

    /// Takes every slot's value, leaving defaults behind.
    ///
    /// # Safety
    ///
    /// Same contract as [`iter_unsynchronized`](Self::iter_unsynchronized).
    pub unsafe fn take_unsynchronized(&self) -> Vec<T>
    where
        T: Default,
    {
        self.slots
            .iter()
            // SAFETY: guaranteed by the caller.
            .map(|slot| std::mem::take(unsafe { &mut *slot.0.get() }))
            .collect()
    }

    /// Iterates the slots mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().map(|slot| slot.0.get_mut())
    }
}

/// Sums `u64` contributions.
pub struct WorkerCounter(PerWorker<u64>);

impl WorkerCounter {
    /// Creates a zeroed counter for `pool`.
    #[must_use]
    pub fn new(pool: &JobPool) -> Self {
        Self(PerWorker::new(pool, || 0))
    }

    /// Adds to the caller's slot.
    #[inline]
    pub fn add(&self, ctx: &WorkerContext, amount: u64) {
        self.0.with_slot(ctx, |slot| *slot += amount);
    }

    /// Sum over all workers.
    ///
    /// # Safety
    ///
    /// Every job that can add to this counter has completed.
    #[must_use]
    pub unsafe fn total(&self) -> u64 {
        // SAFETY: forwarded to the caller.
        unsafe { self.0.iter_unsynchronized() }.sum()
    }

    /// Sum over all workers, with exclusive access.
    #[must_use]
    pub fn total_mut(&mut self) -> u64 {
        self.0.iter_mut().map(|v| *v).sum()
    }

    /// Zeroes every slot.
    pub fn reset(&mut self) {
        self.0.iter_mut().for_each(|v| *v = 0);
    }
}

/// Comparator type of the `Ord`-based reducers.
pub type OrdComparator<T> = fn(&T, &T) -> Ordering;

/// The greatest contribution under an injected comparator.
///
/// A minimum is a maximum under the reversed ordering; see
/// [`WorkerReducer::min`].
pub struct WorkerReducer<T, C = OrdComparator<T>> {
    slots: PerWorker<Option<T>>,
    compare: C,
}

impl<T, C> WorkerReducer<T, C>
where
    T: Copy + Send,
    C: Fn(&T, &T) -> Ordering + Send + Sync,
{
    /// Creates an empty reducer for `pool` keeping the greatest value
    /// under `compare`. Ties keep the value already held.
    #[must_use]
    pub fn new(pool: &JobPool, compare: C) -> Self {
        Self {
            slots: PerWorker::new(pool, || None),
            compare,
        }
    }

    #[inline]
    fn keep(&self, current: T, candidate: T) -> T {
        if (self.compare)(&candidate, &current) == Ordering::Greater {
            candidate
        } else {
            current
        }
    }

    /// Folds `value` into the caller's slot.
    ///
    /// The comparator runs outside the slot borrow.
    #[inline]
    pub fn account(&self, ctx: &WorkerContext, value: T) {
        let current = self.slots.with_slot(ctx, |slot| *slot);
        let next = match current {
            Some(current) => self.keep(current, value),
            None => value,
        };
        self.slots.with_slot(ctx, |slot| *slot = Some(next));
    }

    fn fold<'a>(&self, values: impl Iterator<Item = &'a Option<T>>) -> Option<T>
    where
        T: 'a,
    {
        values.flatten().copied().reduce(|a, b| self.keep(a, b))
    }

    /// Reduced value, or `None` if nothing was accounted.
    ///
    /// # Safety
    ///
    /// Every job that can account into this reducer has completed.
    #[must_use]
    pub unsafe fn value(&self) -> Option<T> {
        // SAFETY: forwarded to the caller.
        self.fold(unsafe { self.slots.iter_unsynchronized() })
    }

    /// Reduced value, with exclusive access.
    #[must_use]
    pub fn value_mut(&mut self) -> Option<T> {
        let values: Vec<Option<T>> = self.slots.iter_mut().map(|v| *v).collect();
        self.fold(values.iter())
    }
}

impl<T: Copy + Ord + Send> WorkerReducer<T> {
    /// Largest value under `Ord`.
    #[must_use]
    pub fn max(pool: &JobPool) -> Self {
        Self::new(pool, T::cmp)
    }

    /// Smallest value under `Ord`.
    #[must_use]
    pub fn min(pool: &JobPool) -> Self {
        Self::new(pool, |a, b| b.cmp(a))
    }
}

/// Collects items from all workers.
///
/// Item order across workers is unspecified; sort after draining when
/// determinism matters.
pub struct WorkerList<T>(PerWorker<Vec<T>>);

impl<T: Send> WorkerList<T> {
    /// Creates empty lists for `pool`.
    #[must_use]
    pub fn new(pool: &JobPool) -> Self {
        Self(PerWorker::new(pool, Vec::new))
    }

    /// Appends to the caller's list.
    #[inline]
    pub fn push(&self, ctx: &WorkerContext, item: T) {
        self.0.with_slot(ctx, |list| list.push(item));
    }

    /// Concatenates and empties every worker's list.
    ///
    /// # Safety
    ///
    /// Every job that can push into this list has completed.
    #[must_use]
    pub unsafe fn drain(&self) -> Vec<T> {
        // SAFETY: forwarded to the caller.
        let lists = unsafe { self.0.take_unsynchronized() };
        lists.into_iter().flatten().collect()
    }

    /// Concatenates and empties every worker's list, with exclusive access.
    #[must_use]
    pub fn drain_mut(&mut self) -> Vec<T> {
        self.0.iter_mut().flat_map(std::mem::take).collect()
    }
}
