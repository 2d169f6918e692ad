use std::{
    borrow::Borrow,
    mem, ptr,
    sync::atomic::{self, Ordering},
};

use crossbeam_epoch::{Atomic, Guard, Owned, Shared};
use triomphe::Arc as TrioArc;

/// The bucket array of a stripe. Its length is always a power of two, and it is
/// never resized in place: a resize publishes a new array and retires this one.
pub(crate) struct BucketArray<K, V> {
    pub(crate) buckets: Box<[Atomic<Entry<K, V>>]>,
}

impl<K, V> BucketArray<K, V> {
    pub(crate) fn with_length(length: usize) -> Self {
        assert!(length.is_power_of_two());

        let buckets = std::iter::repeat_with(Atomic::null)
            .take(length)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self { buckets }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn bucket(&self, hash: u32) -> &Atomic<Entry<K, V>> {
        &self.buckets[hash as usize & (self.buckets.len() - 1)]
    }

    #[inline]
    pub(crate) fn first<'g>(&self, hash: u32, guard: &'g Guard) -> Shared<'g, Entry<K, V>> {
        self.bucket(hash).load(Ordering::Acquire, guard)
    }
}

/// A node of a bucket chain.
///
/// `hash` and `key` never change after creation. `value` and `next` are only
/// written while the owning stripe is locked, with release stores, and are read
/// with acquire loads so that lock-free readers see fully written nodes.
///
/// A live entry always holds a value. Dropping an `Entry` does not drop its
/// value; use one of the `defer_destroy_*` functions instead.
pub(crate) struct Entry<K, V> {
    pub(crate) hash: u32,
    pub(crate) key: TrioArc<K>,
    value: Atomic<V>,
    next: Atomic<Entry<K, V>>,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(hash: u32, key: K, value: V) -> Self {
        Self {
            hash,
            key: TrioArc::new(key),
            value: Atomic::new(value),
            next: Atomic::null(),
        }
    }

    /// Creates a copy of `self` in front of `next` for a resized bucket array.
    /// The copy shares the key and takes over the ownership of the value box, so
    /// `self` must afterwards be destroyed with `defer_destroy_shell`.
    pub(crate) fn relocated<'g>(&self, next: Shared<'g, Entry<K, V>>, guard: &'g Guard) -> Self {
        Self {
            hash: self.hash,
            key: TrioArc::clone(&self.key),
            value: Atomic::from(self.value.load(Ordering::Relaxed, guard)),
            next: Atomic::from(next),
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    pub(crate) fn matches<Q>(&self, key: &Q, hash: u32) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let this_key: &Q = (*self.key).borrow();
        ptr::eq(this_key, key) || (self.hash == hash && this_key == key)
    }

    #[inline]
    pub(crate) fn value<'g>(&self, guard: &'g Guard) -> &'g V {
        let value_ptr = self.value.load(Ordering::Acquire, guard);
        debug_assert!(!value_ptr.is_null());
        unsafe { value_ptr.deref() }
    }

    /// Stores a new value and returns a reference to the replaced one. The
    /// replaced value stays readable until `guard` is dropped.
    ///
    /// Must be called while holding the stripe lock.
    pub(crate) fn swap_value<'g>(&self, value: V, guard: &'g Guard) -> &'g V {
        let old_ptr = self.value.swap(Owned::new(value), Ordering::AcqRel, guard);
        unsafe {
            defer_acquire_destroy(guard, old_ptr);
            old_ptr.deref()
        }
    }

    #[inline]
    pub(crate) fn next<'g>(&self, guard: &'g Guard) -> Shared<'g, Entry<K, V>> {
        self.next.load(Ordering::Acquire, guard)
    }

    /// Must be called while holding the stripe lock.
    #[inline]
    pub(crate) fn set_next(&self, next: Shared<'_, Entry<K, V>>) {
        self.next.store(next, Ordering::Release);
    }
}

/// A key and value waiting for the stripe lock. While the lock is contended,
/// the waiting thread may allocate the entry in advance.
pub(crate) enum PendingInsert<K, V> {
    New(K, V),
    Allocated(Unpublished<K, V>),
}

impl<K, V> PendingInsert<K, V> {
    pub(crate) fn key(&self) -> &K {
        match self {
            PendingInsert::New(k, _) => k,
            PendingInsert::Allocated(e) => e.0.key(),
        }
    }

    pub(crate) fn is_allocated(&self) -> bool {
        matches!(self, PendingInsert::Allocated(_))
    }

    pub(crate) fn allocate(self, hash: u32) -> Self {
        match self {
            PendingInsert::New(k, v) => {
                PendingInsert::Allocated(Unpublished(Owned::new(Entry::new(hash, k, v))))
            }
            allocated => allocated,
        }
    }

    pub(crate) fn into_entry(self, hash: u32, next: Shared<'_, Entry<K, V>>) -> Owned<Entry<K, V>> {
        let entry = match self.allocate(hash) {
            PendingInsert::Allocated(e) => e.into_owned(),
            PendingInsert::New(..) => unreachable!(),
        };
        entry.next.store(next, Ordering::Relaxed);
        entry
    }

    /// Gives the value back when the key turned out to be present already.
    pub(crate) fn into_value(self) -> V {
        match self {
            PendingInsert::New(_, v) => v,
            PendingInsert::Allocated(e) => {
                let Entry { value, .. } = *e.into_owned().into_box();
                // The entry was never published, so nobody else can see the value.
                unsafe { *value.into_owned().into_box() }
            }
        }
    }
}

/// An entry that has not been linked into a bucket. Unlike a bare `Entry`, it
/// drops its value when it is dropped, e.g. while unwinding from a panicking
/// `Eq` implementation.
pub(crate) struct Unpublished<K, V>(Owned<Entry<K, V>>);

impl<K, V> Unpublished<K, V> {
    fn into_owned(self) -> Owned<Entry<K, V>> {
        let this = mem::ManuallyDrop::new(self);
        // `this` is never dropped, so the entry is moved out exactly once.
        unsafe { ptr::read(&this.0) }
    }
}

impl<K, V> Drop for Unpublished<K, V> {
    fn drop(&mut self) {
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let value_ptr = self.0.value.load(Ordering::Relaxed, guard);
        if !value_ptr.is_null() {
            unsafe { mem::drop(value_ptr.into_owned()) };
        }
    }
}

/// Destroys an unlinked entry and its value once no reader can reach them.
pub(crate) unsafe fn defer_destroy_entry<'g, K, V>(guard: &'g Guard, ptr: Shared<'g, Entry<K, V>>) {
    assert!(!ptr.is_null());

    guard.defer_unchecked(move || {
        atomic::fence(Ordering::Acquire);
        destroy_entry(ptr);
    });
}

/// Destroys an entry that was relocated by a resize. The value is owned by the
/// relocated copy, so only the entry allocation is freed.
pub(crate) unsafe fn defer_destroy_shell<'g, K, V>(guard: &'g Guard, ptr: Shared<'g, Entry<K, V>>) {
    assert!(!ptr.is_null());

    guard.defer_unchecked(move || {
        atomic::fence(Ordering::Acquire);
        mem::drop(ptr.into_owned());
    });
}

pub(crate) unsafe fn defer_acquire_destroy<'g, T>(guard: &'g Guard, ptr: Shared<'g, T>) {
    assert!(!ptr.is_null());

    guard.defer_unchecked(move || {
        atomic::fence(Ordering::Acquire);
        mem::drop(ptr.into_owned());
    });
}

/// Immediately destroys an entry and its value. The caller must have exclusive
/// access to it.
pub(crate) unsafe fn destroy_entry<K, V>(ptr: Shared<'_, Entry<K, V>>) {
    let entry = ptr.into_owned();
    let value_ptr = entry.value.load(Ordering::Relaxed, crossbeam_epoch::unprotected());
    if !value_ptr.is_null() {
        mem::drop(value_ptr.into_owned());
    }
    mem::drop(entry);
}

/// Immediately destroys every chain of `array`, then `array` itself. The caller
/// must have exclusive access to them.
pub(crate) unsafe fn destroy_bucket_array<K, V>(array: Shared<'_, BucketArray<K, V>>) {
    let guard = crossbeam_epoch::unprotected();

    if let Some(array_ref) = array.as_ref() {
        for bucket in array_ref.buckets.iter() {
            let mut entry_ptr = bucket.load(Ordering::Relaxed, guard);
            while let Some(entry_ref) = entry_ptr.as_ref() {
                let next_ptr = entry_ref.next.load(Ordering::Relaxed, guard);
                destroy_entry(entry_ptr);
                entry_ptr = next_ptr;
            }
        }
        mem::drop(array.into_owned());
    }
}
