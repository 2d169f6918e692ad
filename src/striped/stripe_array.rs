use super::stripe::{Stripe, StripeLock};
use crate::common::constants::HASH_BITS;

use std::sync::atomic::{self, Ordering};

use crossbeam_epoch::{Atomic, CompareExchangeError, Owned, Shared};
use smallvec::SmallVec;

/// Lock guards of every stripe, held by a whole-map operation.
pub(crate) type AllStripesLocked<'a> = SmallVec<[StripeLock<'a>; 16]>;

/// A fixed-size array of stripes.
///
/// Slot 0 is created eagerly and serves as the template for the other slots,
/// which are created on the first write routed to them. A slot is written
/// exactly once; a published stripe is never replaced or freed before the array
/// itself is dropped.
pub(crate) struct StripeArray<K, V> {
    slots: Box<[Atomic<Stripe<K, V>>]>,
    shift: u32,
    mask: usize,
}

impl<K, V> StripeArray<K, V> {
    /// # Panics
    ///
    /// Panics if `num_stripes` is not a power of two.
    pub(crate) fn new(num_stripes: usize, template: Stripe<K, V>) -> Self {
        assert!(num_stripes.is_power_of_two());

        let stripe_bits = num_stripes.trailing_zeros();
        debug_assert!(stripe_bits <= HASH_BITS);

        let slots = std::iter::once(Atomic::new(template))
            .chain(std::iter::repeat_with(Atomic::null))
            .take(num_stripes)
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            shift: HASH_BITS - stripe_bits,
            mask: num_stripes - 1,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Picks the stripe from the upper bits of the spread hash.
    #[inline]
    pub(crate) fn index_for(&self, hash: u32) -> usize {
        // With a single stripe the shift is 32, which would overflow.
        hash.checked_shr(self.shift).unwrap_or(0) as usize & self.mask
    }

    /// Returns the stripe at `index` if it has been created.
    #[inline]
    pub(crate) fn get(&self, index: usize) -> Option<&Stripe<K, V>> {
        // Published stripes live as long as `self`, so no epoch is needed to
        // keep them alive.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        unsafe { self.slots[index].load(Ordering::Acquire, guard).as_ref() }
    }

    #[inline]
    pub(crate) fn stripe_for(&self, hash: u32) -> Option<&Stripe<K, V>> {
        self.get(self.index_for(hash))
    }

    fn template(&self) -> &Stripe<K, V> {
        self.get(0)
            .unwrap_or_else(|| unreachable!("the template stripe is created eagerly"))
    }

    /// Returns the stripe at `index`, creating it first if needed.
    ///
    /// Racing threads each build a candidate; only one of them is published and
    /// the others are dropped.
    pub(crate) fn ensure(&self, index: usize) -> &Stripe<K, V> {
        if let Some(stripe) = self.get(index) {
            return stripe;
        }

        let guard = unsafe { crossbeam_epoch::unprotected() };
        let slot = &self.slots[index];
        let mut candidate = Owned::new(self.template().sibling());

        loop {
            match slot.compare_exchange(
                Shared::null(),
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(published) => {
                    #[cfg(feature = "logging")]
                    log::trace!("Created stripe {index} of {}", self.len());

                    return unsafe { published.deref() };
                }
                Err(CompareExchangeError { current, new }) => {
                    if let Some(stripe) = unsafe { current.as_ref() } {
                        // Lost the race; `new` is dropped here.
                        return stripe;
                    }
                    candidate = new;
                }
            }
        }
    }

    #[inline]
    pub(crate) fn ensure_for(&self, hash: u32) -> &Stripe<K, V> {
        self.ensure(self.index_for(hash))
    }

    /// Iterates over the stripes that have been created, in index order.
    pub(crate) fn existing(&self) -> impl Iterator<Item = &Stripe<K, V>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub(crate) fn mod_count_sum(&self) -> usize {
        self.existing()
            .fold(0, |sum, s| sum.wrapping_add(s.mod_count()))
    }

    /// Locks every stripe in index order, creating missing ones so that no
    /// write can slip into a stripe that did not exist yet.
    pub(crate) fn lock_all(&self) -> AllStripesLocked<'_> {
        (0..self.len()).map(|i| self.ensure(i).lock()).collect()
    }
}

impl<K, V> Drop for StripeArray<K, V> {
    fn drop(&mut self) {
        let guard = unsafe { crossbeam_epoch::unprotected() };
        atomic::fence(Ordering::Acquire);

        for slot in self.slots.iter() {
            let stripe_ptr = slot.load(Ordering::Relaxed, guard);
            if !stripe_ptr.is_null() {
                unsafe { drop(stripe_ptr.into_owned()) };
            }
        }
    }
}
