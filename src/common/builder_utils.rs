use super::{
    constants::{
        DEFAULT_CONCURRENCY_LEVEL, DEFAULT_INITIAL_CAPACITY, DEFAULT_LOAD_FACTOR, MAXIMUM_CAPACITY,
        MAX_STRIPES, MIN_STRIPE_TABLE_CAPACITY,
    },
    error::Error,
};

/// The validated shape of a new map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Layout {
    pub(crate) num_stripes: usize,
    /// Initial bucket array length of every stripe.
    pub(crate) stripe_capacity: usize,
    pub(crate) load_factor: f32,
}

pub(crate) fn ensure_load_factor(load_factor: f32) -> Result<f32, Error> {
    // Also rejects NaN.
    if load_factor > 0.0 {
        Ok(load_factor)
    } else {
        Err(Error::invalid_argument(
            "load_factor",
            "must be greater than zero",
        ))
    }
}

pub(crate) fn layout(
    initial_capacity: usize,
    load_factor: f32,
    concurrency_level: usize,
) -> Result<Layout, Error> {
    if initial_capacity == 0 {
        return Err(Error::invalid_argument(
            "initial_capacity",
            "must be greater than zero",
        ));
    }
    let load_factor = ensure_load_factor(load_factor)?;
    if concurrency_level == 0 {
        return Err(Error::invalid_argument(
            "concurrency_level",
            "must be greater than zero",
        ));
    }

    Ok(shape(initial_capacity, load_factor, concurrency_level))
}

/// Computes the layout for arguments that are known to be in range. A zero
/// capacity yields the smallest bucket arrays.
pub(crate) fn shape(initial_capacity: usize, load_factor: f32, concurrency_level: usize) -> Layout {
    debug_assert!(load_factor > 0.0 && concurrency_level > 0);

    let num_stripes = concurrency_level.clamp(1, MAX_STRIPES).next_power_of_two();
    let initial_capacity = initial_capacity.min(MAXIMUM_CAPACITY);

    let per_stripe = (initial_capacity + num_stripes - 1) / num_stripes;
    let stripe_capacity = per_stripe
        .max(MIN_STRIPE_TABLE_CAPACITY)
        .next_power_of_two();

    Layout {
        num_stripes,
        stripe_capacity,
        load_factor,
    }
}

impl Default for Layout {
    fn default() -> Self {
        shape(
            DEFAULT_INITIAL_CAPACITY,
            DEFAULT_LOAD_FACTOR,
            DEFAULT_CONCURRENCY_LEVEL,
        )
    }
}

/// Checks a stripe count that did not come from `layout`, e.g. one recorded
/// alongside entries that are being restored.
pub(crate) fn ensure_restored_stripes(num_stripes: usize) -> Result<usize, Error> {
    if num_stripes == 0 || num_stripes > MAX_STRIPES || !num_stripes.is_power_of_two() {
        Err(Error::CorruptedState(format!(
            "bad number of stripes: {num_stripes}"
        )))
    } else {
        Ok(num_stripes)
    }
}

/// The number of entries a stripe may hold before its bucket array is doubled.
pub(crate) fn threshold(capacity: usize, load_factor: f32) -> usize {
    // `as` saturates, so an infinite load factor disables resizing.
    (capacity as f64 * load_factor as f64) as usize
}
