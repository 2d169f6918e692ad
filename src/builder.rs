use crate::{
    common::{
        builder_utils,
        constants::{DEFAULT_CONCURRENCY_LEVEL, DEFAULT_INITIAL_CAPACITY, DEFAULT_LOAD_FACTOR},
        error::Error,
    },
    striped::{DefaultHashBuilder, HashMap},
};

use std::{
    hash::{BuildHasher, Hash},
    marker::PhantomData,
};

/// Builds a [`HashMap`][map-struct] with various configuration knobs.
///
/// [map-struct]: ./struct.HashMap.html
///
/// # Examples
///
/// ```rust
/// use lockstripe::HashMapBuilder;
///
/// let map = HashMapBuilder::new()
///     // Expect about 10,000 entries.
///     .initial_capacity(10_000)
///     // Resize a stripe when it is half full.
///     .load_factor(0.5)
///     // Up to 64 threads are expected to write at the same time.
///     .concurrency_level(64)
///     // Create the map.
///     .build()
///     .expect("valid configuration");
///
/// map.insert(0, "zero");
/// assert_eq!(map.num_stripes(), 64);
/// assert_eq!(map.get(&0), Some("zero"));
/// ```
///
/// Invalid values are reported when the map is built:
///
/// ```rust
/// use lockstripe::HashMapBuilder;
///
/// let result = HashMapBuilder::<u32, u32>::new().load_factor(0.0).build();
/// assert!(result.unwrap_err().is_invalid_argument());
/// ```
///
#[must_use]
pub struct HashMapBuilder<K, V> {
    initial_capacity: usize,
    load_factor: f32,
    concurrency_level: usize,
    map_type: PhantomData<HashMap<K, V>>,
}

impl<K, V> Default for HashMapBuilder<K, V> {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
            concurrency_level: DEFAULT_CONCURRENCY_LEVEL,
            map_type: PhantomData,
        }
    }
}

impl<K, V> HashMapBuilder<K, V>
where
    K: Eq + Hash,
{
    /// Construct a new `HashMapBuilder` with the default parameters: an initial
    /// capacity of 16, a load factor of 0.75 and a concurrency level of 16.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `HashMap<K, V>`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the initial capacity or the
    /// concurrency level is zero, or if the load factor is not greater than zero.
    pub fn build(self) -> Result<HashMap<K, V, DefaultHashBuilder>, Error> {
        self.build_with_hasher(DefaultHashBuilder::default())
    }

    /// Builds a `HashMap<K, V, S>` that uses `hasher` to hash the keys.
    ///
    /// # Errors
    ///
    /// Same as [`build`](#method.build).
    pub fn build_with_hasher<S>(self, hasher: S) -> Result<HashMap<K, V, S>, Error>
    where
        S: BuildHasher,
    {
        let layout = builder_utils::layout(
            self.initial_capacity,
            self.load_factor,
            self.concurrency_level,
        )?;
        Ok(HashMap::with_layout(layout, hasher))
    }
}

impl<K, V> HashMapBuilder<K, V> {
    /// Sets the number of entries the map should hold before any stripe needs
    /// to grow. The entries are assumed to spread evenly over the stripes.
    pub fn initial_capacity(self, initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            ..self
        }
    }

    /// Sets the ratio of entries to buckets above which a stripe doubles its
    /// bucket array.
    pub fn load_factor(self, load_factor: f32) -> Self {
        Self {
            load_factor,
            ..self
        }
    }

    /// Sets the number of threads expected to write to the map at the same
    /// time. The number of stripes is this value rounded up to a power of two,
    /// capped at 65,536.
    pub fn concurrency_level(self, concurrency_level: usize) -> Self {
        Self {
            concurrency_level,
            ..self
        }
    }
}
