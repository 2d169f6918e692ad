pub(crate) const DEFAULT_INITIAL_CAPACITY: usize = 16;
pub(crate) const DEFAULT_LOAD_FACTOR: f32 = 0.75;
pub(crate) const DEFAULT_CONCURRENCY_LEVEL: usize = 16;

/// The largest bucket array a single stripe may grow to. A stripe whose array
/// has reached this length stops resizing and its chains grow instead.
pub(crate) const MAXIMUM_CAPACITY: usize = 1 << 30;

/// The smallest bucket array length of a stripe. Using at least 2 avoids an
/// immediate resize after the first insertion into a lazily created stripe.
pub(crate) const MIN_STRIPE_TABLE_CAPACITY: usize = 2;

// 65536
pub(crate) const MAX_STRIPES: usize = 1 << 16;

/// Number of optimistic (unlocked) passes `len`, `is_empty` and
/// `contains_value` make before locking every stripe.
pub(crate) const RETRIES_BEFORE_LOCK: usize = 2;

/// Upper bound of `try_lock` attempts while scanning a bucket before blocking on
/// a stripe lock.
pub(crate) const MAX_SCAN_RETRIES_MULTI_CORE: usize = 64;
pub(crate) const MAX_SCAN_RETRIES_SINGLE_CORE: usize = 1;

/// The spread hash is 32 bits wide. The stripe index is taken from its upper
/// bits and the bucket index from its lower bits.
pub(crate) const HASH_BITS: u32 = 32;
