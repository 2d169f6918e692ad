pub(crate) mod builder_utils;
pub(crate) mod constants;
pub(crate) mod error;

use once_cell::sync::Lazy;

use self::constants::{MAX_SCAN_RETRIES_MULTI_CORE, MAX_SCAN_RETRIES_SINGLE_CORE};

/// On a single core machine, spinning on a held stripe lock only delays the
/// thread that holds it, so blocking right away is better.
pub(crate) static MAX_SCAN_RETRIES: Lazy<usize> = Lazy::new(|| {
    if available_parallelism() > 1 {
        MAX_SCAN_RETRIES_MULTI_CORE
    } else {
        MAX_SCAN_RETRIES_SINGLE_CORE
    }
});

pub(crate) fn available_parallelism() -> usize {
    use std::{num::NonZeroUsize, thread::available_parallelism};
    available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}
