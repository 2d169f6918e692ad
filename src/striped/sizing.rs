//! Whole-map queries without a map-wide lock.
//!
//! A query first runs optimistically: it visits every stripe without locking
//! and accepts the result if the sum of the stripes' modification counters did
//! not change while it ran. After `RETRIES_BEFORE_LOCK` failed attempts it locks
//! every stripe in index order and runs once more.

use super::{stripe::Stripe, stripe_array::StripeArray};
use crate::common::constants::RETRIES_BEFORE_LOCK;

use std::ops::ControlFlow;

/// Folds `visit` over the stripes, returning a result that was true at some
/// point during the call.
///
/// `visit` may return `ControlFlow::Break` when its answer cannot change
/// anymore, e.g. when a value it looks for has been seen.
pub(crate) fn fold_stripes<K, V, A, F>(stripes: &StripeArray<K, V>, init: A, mut visit: F) -> A
where
    A: Clone,
    F: FnMut(A, &Stripe<K, V>) -> ControlFlow<A, A>,
{
    for _ in 0..=RETRIES_BEFORE_LOCK {
        let mods_before = stripes.mod_count_sum();

        match stripes.existing().try_fold(init.clone(), &mut visit) {
            ControlFlow::Break(answer) => return answer,
            ControlFlow::Continue(acc) => {
                if stripes.mod_count_sum() == mods_before {
                    return acc;
                }
            }
        }
    }

    #[cfg(feature = "logging")]
    log::debug!(
        "Stripes kept changing during {} scans. Locking all {} stripes",
        RETRIES_BEFORE_LOCK + 1,
        stripes.len()
    );

    let _locks = stripes.lock_all();
    match stripes.existing().try_fold(init, visit) {
        ControlFlow::Break(answer) | ControlFlow::Continue(answer) => answer,
    }
}

pub(crate) fn len<K, V>(stripes: &StripeArray<K, V>) -> usize {
    fold_stripes(stripes, 0usize, |sum, stripe| {
        ControlFlow::Continue(sum + stripe.count())
    })
}

pub(crate) fn is_empty<K, V>(stripes: &StripeArray<K, V>) -> bool {
    fold_stripes(stripes, true, |_, stripe| {
        if stripe.count() == 0 {
            ControlFlow::Continue(true)
        } else {
            ControlFlow::Break(false)
        }
    })
}

pub(crate) fn contains_value<K, V: PartialEq>(stripes: &StripeArray<K, V>, value: &V) -> bool {
    fold_stripes(stripes, false, |_, stripe| {
        let not_found = stripe.for_each_entry(|_, v| v != value);
        if not_found {
            ControlFlow::Continue(false)
        } else {
            ControlFlow::Break(true)
        }
    })
}
