use super::entry::{
    self, defer_destroy_entry, defer_destroy_shell, BucketArray, Entry, PendingInsert,
};
use crate::common::{builder_utils, constants::MAXIMUM_CAPACITY, MAX_SCAN_RETRIES};

use std::{
    borrow::Borrow,
    sync::atomic::{self, AtomicUsize, Ordering},
};

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};
use crossbeam_utils::Backoff;
use parking_lot::{Mutex, MutexGuard};

/// State that is only touched while the stripe lock is held.
pub(crate) struct StripeState {
    threshold: usize,
}

pub(crate) type StripeLock<'a> = MutexGuard<'a, StripeState>;

/// An independently locked partition of the map.
///
/// Reads walk the current bucket array without locking. Every mutation holds
/// `lock`, so `count` and `mod_count` are only written by the lock holder; they
/// are atomics because the whole-map queries read them without the lock.
pub(crate) struct Stripe<K, V> {
    table: Atomic<BucketArray<K, V>>,
    count: AtomicUsize,
    mod_count: AtomicUsize,
    load_factor: f32,
    lock: Mutex<StripeState>,
}

impl<K, V> Stripe<K, V> {
    pub(crate) fn new(capacity: usize, load_factor: f32) -> Self {
        Self {
            table: Atomic::new(BucketArray::with_length(capacity)),
            count: AtomicUsize::new(0),
            mod_count: AtomicUsize::new(0),
            load_factor,
            lock: Mutex::new(StripeState {
                threshold: builder_utils::threshold(capacity, load_factor),
            }),
        }
    }

    /// Creates an empty stripe shaped like `self`: same bucket array length
    /// and load factor.
    pub(crate) fn sibling(&self) -> Self {
        let guard = &crossbeam_epoch::pin();
        Self::new(self.table(guard).len(), self.load_factor)
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn mod_count(&self) -> usize {
        self.mod_count.load(Ordering::Acquire)
    }

    pub(crate) fn capacity(&self) -> usize {
        let guard = &crossbeam_epoch::pin();
        self.table(guard).len()
    }

    pub(crate) fn lock(&self) -> StripeLock<'_> {
        self.lock.lock()
    }

    #[inline]
    fn table<'g>(&self, guard: &'g Guard) -> &'g BucketArray<K, V> {
        let table_ptr = self.table.load(Ordering::Acquire, guard);
        // A stripe always has a bucket array.
        unsafe { table_ptr.deref() }
    }

    #[inline]
    fn first_entry<'g>(&self, hash: u32, guard: &'g Guard) -> Shared<'g, Entry<K, V>> {
        self.table(guard).first(hash, guard)
    }

    /// Runs `mutate` between two increments of the modification counter.
    /// Must be called while holding the lock.
    ///
    /// A lock-free reader that sees any store made by `mutate` will see the
    /// first increment on its next read of the counter, and a reader that sees
    /// the second increment will see every store made by `mutate`.
    #[inline]
    fn modify<T>(&self, mutate: impl FnOnce() -> T) -> T {
        self.mod_count.fetch_add(1, Ordering::Release);
        let result = mutate();
        self.mod_count.fetch_add(1, Ordering::Release);
        result
    }

    #[cfg(test)]
    pub(crate) fn try_lock(&self) -> Option<StripeLock<'_>> {
        self.lock.try_lock()
    }

    /// Calls `visit` with every entry of the current bucket array until it
    /// returns `false`. Returns `false` if it was stopped.
    pub(crate) fn for_each_entry<F>(&self, mut visit: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        let guard = &crossbeam_epoch::pin();
        let table = self.table(guard);

        for bucket in table.buckets.iter() {
            let mut entry_ptr = bucket.load(Ordering::Acquire, guard);
            while let Some(entry_ref) = unsafe { entry_ptr.as_ref() } {
                if !visit(entry_ref.key(), entry_ref.value(guard)) {
                    return false;
                }
                entry_ptr = entry_ref.next(guard);
            }
        }

        true
    }

    /// Unlinks every entry. Readers that are already walking the bucket array
    /// may still see them.
    pub(crate) fn clear(&self) {
        let _state = self.lock.lock();
        let guard = &crossbeam_epoch::pin();
        self.clear_locked(guard);
    }

    fn clear_locked(&self, guard: &Guard) {
        self.modify(|| {
            for bucket in self.table(guard).buckets.iter() {
                let mut entry_ptr = bucket.swap(Shared::null(), Ordering::AcqRel, guard);
                while let Some(entry_ref) = unsafe { entry_ptr.as_ref() } {
                    let next_ptr = entry_ref.next(guard);
                    unsafe { defer_destroy_entry(guard, entry_ptr) };
                    entry_ptr = next_ptr;
                }
            }

            self.count.store(0, Ordering::Release);
        });
    }
}

impl<K: Eq, V> Stripe<K, V> {
    /// Looks up `key` without taking the lock.
    pub(crate) fn get_key_value_and<Q, F, T>(&self, key: &Q, hash: u32, with_entry: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        F: FnOnce(&K, &V) -> T,
    {
        let guard = &crossbeam_epoch::pin();
        let mut entry_ptr = self.first_entry(hash, guard);

        while let Some(entry_ref) = unsafe { entry_ptr.as_ref() } {
            if entry_ref.matches(key, hash) {
                return Some(with_entry(entry_ref.key(), entry_ref.value(guard)));
            }
            entry_ptr = entry_ref.next(guard);
        }

        None
    }

    pub(crate) fn contains_key<Q>(&self, key: &Q, hash: u32) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.get_key_value_and(key, hash, |_, _| ()).is_some()
    }

    /// Inserts or, unless `only_if_absent`, overwrites the value of `key`.
    /// Returns the result of `with_old_value` applied to the value that was
    /// present before the call, if any.
    pub(crate) fn insert_and<F, T>(
        &self,
        key: K,
        hash: u32,
        value: V,
        only_if_absent: bool,
        with_old_value: F,
    ) -> Option<T>
    where
        F: FnOnce(&V) -> T,
    {
        let guard = &mut crossbeam_epoch::pin();
        let pending = PendingInsert::New(key, value);
        let (mut state, pending) = match self.lock.try_lock() {
            Some(state) => (state, pending),
            None => self.scan_and_lock_for_insert(pending, hash, guard),
        };
        let guard = &*guard;

        let table = self.table(guard);
        let bucket = table.bucket(hash);
        let first = bucket.load(Ordering::Acquire, guard);

        let mut entry_ptr = first;
        while let Some(entry_ref) = unsafe { entry_ptr.as_ref() } {
            if entry_ref.matches(pending.key(), hash) {
                if only_if_absent {
                    let result = with_old_value(entry_ref.value(guard));
                    drop(pending.into_value());
                    return Some(result);
                }
                let old_value = self.modify(|| entry_ref.swap_value(pending.into_value(), guard));
                return Some(with_old_value(old_value));
            }
            entry_ptr = entry_ref.next(guard);
        }

        let new_entry = pending.into_entry(hash, first);
        let count = self.count.load(Ordering::Relaxed) + 1;

        self.modify(|| {
            if count > state.threshold && table.len() < MAXIMUM_CAPACITY {
                self.rehash(&mut state, table, new_entry, guard);
            } else {
                bucket.store(new_entry, Ordering::Release);
            }
            self.count.store(count, Ordering::Release);
        });

        None
    }

    /// Removes `key` if `condition` returns `true` for its current entry.
    pub(crate) fn remove_if_and<Q, F, G, T>(
        &self,
        key: &Q,
        hash: u32,
        condition: F,
        with_previous_value: G,
    ) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        F: FnOnce(&K, &V) -> bool,
        G: FnOnce(&V) -> T,
    {
        let guard = &mut crossbeam_epoch::pin();
        let _state = self.scan_and_lock(key, hash, guard);
        let guard = &*guard;

        let bucket = self.table(guard).bucket(hash);
        let mut pred: Option<&Entry<K, V>> = None;
        let mut entry_ptr = bucket.load(Ordering::Acquire, guard);

        while let Some(entry_ref) = unsafe { entry_ptr.as_ref() } {
            let next_ptr = entry_ref.next(guard);

            if entry_ref.matches(key, hash) {
                let value = entry_ref.value(guard);
                if !condition(entry_ref.key(), value) {
                    return None;
                }

                self.modify(|| {
                    match pred {
                        Some(pred_ref) => pred_ref.set_next(next_ptr),
                        None => bucket.store(next_ptr, Ordering::Release),
                    }
                    self.count
                        .store(self.count.load(Ordering::Relaxed) - 1, Ordering::Release);
                });

                let result = with_previous_value(value);
                unsafe { defer_destroy_entry(guard, entry_ptr) };
                return Some(result);
            }

            pred = Some(entry_ref);
            entry_ptr = next_ptr;
        }

        None
    }

    /// Overwrites the value of `key` if it is present and `condition` returns
    /// `true` for its current value.
    pub(crate) fn replace_if_and<Q, F, G, T>(
        &self,
        key: &Q,
        hash: u32,
        value: V,
        condition: F,
        with_old_value: G,
    ) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        F: FnOnce(&V) -> bool,
        G: FnOnce(&V) -> T,
    {
        let guard = &mut crossbeam_epoch::pin();
        let _state = self.scan_and_lock(key, hash, guard);
        let guard = &*guard;

        let mut entry_ptr = self.first_entry(hash, guard);
        while let Some(entry_ref) = unsafe { entry_ptr.as_ref() } {
            if entry_ref.matches(key, hash) {
                if !condition(entry_ref.value(guard)) {
                    return None;
                }
                let old_value = self.modify(|| entry_ref.swap_value(value, guard));
                return Some(with_old_value(old_value));
            }
            entry_ptr = entry_ref.next(guard);
        }

        None
    }

    /// Spins on `try_lock` while walking the bucket for `pending`'s key. If the
    /// end of the chain is reached without a match, the entry is allocated
    /// before the lock is held. The search is repeated under the lock by the
    /// caller, so the result of the scan is only a hint.
    ///
    /// `guard` is unpinned while blocking on the lock, so the caller must reload
    /// every pointer it loaded before the call.
    fn scan_and_lock_for_insert<'a>(
        &'a self,
        mut pending: PendingInsert<K, V>,
        hash: u32,
        guard: &mut Guard,
    ) -> (StripeLock<'a>, PendingInsert<K, V>) {
        let backoff = Backoff::new();
        let mut first = self.first_entry(hash, guard);
        let mut entry_ptr = first;
        // `None` while still walking the chain.
        let mut retries: Option<usize> = None;

        loop {
            if let Some(state) = self.lock.try_lock() {
                return (state, pending);
            }

            match retries {
                None => match unsafe { entry_ptr.as_ref() } {
                    None => {
                        if !pending.is_allocated() {
                            pending = pending.allocate(hash);
                        }
                        retries = Some(0);
                    }
                    Some(entry_ref) if entry_ref.matches(pending.key(), hash) => {
                        retries = Some(0);
                    }
                    Some(entry_ref) => entry_ptr = entry_ref.next(guard),
                },
                Some(n) if n + 1 > *MAX_SCAN_RETRIES => {
                    return (guard.repin_after(|| self.lock.lock()), pending);
                }
                Some(n) => {
                    retries = Some(n + 1);
                    backoff.spin();
                    if (n + 1) & 1 == 0 {
                        let current = self.first_entry(hash, guard);
                        if current != first {
                            // The bucket changed under us. Walk it again.
                            first = current;
                            entry_ptr = current;
                            retries = None;
                        }
                    }
                }
            }
        }
    }

    /// Same as `scan_and_lock_for_insert` without the allocation. The lock is
    /// taken even when the key is absent so that removals and replacements are
    /// ordered with other writes to this stripe.
    fn scan_and_lock<Q>(&self, key: &Q, hash: u32, guard: &mut Guard) -> StripeLock<'_>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let backoff = Backoff::new();
        let mut first = self.first_entry(hash, guard);
        let mut entry_ptr = first;
        let mut retries: Option<usize> = None;

        loop {
            if let Some(state) = self.lock.try_lock() {
                return state;
            }

            match retries {
                None => match unsafe { entry_ptr.as_ref() } {
                    Some(entry_ref) if !entry_ref.matches(key, hash) => {
                        entry_ptr = entry_ref.next(guard);
                    }
                    _ => retries = Some(0),
                },
                Some(n) if n + 1 > *MAX_SCAN_RETRIES => {
                    return guard.repin_after(|| self.lock.lock());
                }
                Some(n) => {
                    retries = Some(n + 1);
                    backoff.spin();
                    if (n + 1) & 1 == 0 {
                        let current = self.first_entry(hash, guard);
                        if current != first {
                            first = current;
                            entry_ptr = current;
                            retries = None;
                        }
                    }
                }
            }
        }
    }

    /// Doubles the bucket array, then adds `new_entry` to the new array and
    /// publishes it.
    ///
    /// Each chain splits into at most two chains in the new array: an entry
    /// either keeps its index or moves up by the old length. The longest tail of
    /// a chain whose entries all land in the same new bucket is reused as is.
    /// Only the entries in front of it are relocated, so the old array stays a
    /// consistent snapshot for readers that are still walking it.
    fn rehash<'g>(
        &self,
        state: &mut StripeState,
        old_table: &'g BucketArray<K, V>,
        new_entry: Owned<Entry<K, V>>,
        guard: &'g Guard,
    ) {
        let old_capacity = old_table.len();
        let new_capacity = old_capacity << 1;
        state.threshold = builder_utils::threshold(new_capacity, self.load_factor);

        let new_table = BucketArray::with_length(new_capacity);
        let size_mask = new_capacity - 1;

        for bucket in old_table.buckets.iter() {
            let head = bucket.load(Ordering::Acquire, guard);
            let Some(head_ref) = (unsafe { head.as_ref() }) else {
                continue;
            };

            let next = head_ref.next(guard);
            let index = head_ref.hash as usize & size_mask;

            if next.is_null() {
                // Single entry on the chain.
                new_table.buckets[index].store(head, Ordering::Relaxed);
                continue;
            }

            let mut last_run = head;
            let mut last_index = index;
            let mut last = next;
            while let Some(last_ref) = unsafe { last.as_ref() } {
                let k = last_ref.hash as usize & size_mask;
                if k != last_index {
                    last_index = k;
                    last_run = last;
                }
                last = last_ref.next(guard);
            }
            new_table.buckets[last_index].store(last_run, Ordering::Relaxed);

            let mut entry_ptr = head;
            while entry_ptr != last_run {
                let entry_ref = unsafe { entry_ptr.deref() };
                let k = entry_ref.hash as usize & size_mask;
                let new_bucket = &new_table.buckets[k];
                let relocated = entry_ref.relocated(new_bucket.load(Ordering::Relaxed, guard), guard);
                new_bucket.store(Owned::new(relocated), Ordering::Relaxed);

                let next_ptr = entry_ref.next(guard);
                unsafe { defer_destroy_shell(guard, entry_ptr) };
                entry_ptr = next_ptr;
            }
        }

        let new_bucket = new_table.bucket(new_entry.hash);
        new_entry.set_next(new_bucket.load(Ordering::Relaxed, guard));
        new_bucket.store(new_entry, Ordering::Relaxed);

        let old_ptr = self.table.swap(Owned::new(new_table), Ordering::AcqRel, guard);
        unsafe { entry::defer_acquire_destroy(guard, old_ptr) };

        #[cfg(feature = "logging")]
        log::debug!(
            "Resized a stripe from {old_capacity} to {new_capacity} buckets (threshold: {})",
            state.threshold
        );
    }
}

impl<K, V> Drop for Stripe<K, V> {
    fn drop(&mut self) {
        let guard = unsafe { crossbeam_epoch::unprotected() };
        atomic::fence(Ordering::Acquire);

        let table_ptr = self.table.load(Ordering::Relaxed, guard);
        unsafe { entry::destroy_bucket_array(table_ptr) };
    }
}
