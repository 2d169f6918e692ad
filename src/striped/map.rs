use super::{
    hash,
    iter::{Iter, Keys, Values},
    sizing,
    stripe::Stripe,
    stripe_array::StripeArray,
};
use crate::common::{
    builder_utils::{self, Layout},
    constants::MIN_STRIPE_TABLE_CAPACITY,
    error::Error,
};

use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
};

/// Default hasher for `HashMap`.
pub type DefaultHashBuilder = RandomState;

/// A concurrent hash map that splits its entries between a fixed number of
/// independently locked stripes.
///
/// Lookups never block: they walk a stripe's current bucket array without
/// taking any lock. Each mutation locks only the stripe its key belongs to, so
/// writes to different stripes proceed in parallel. The number of stripes is
/// the concurrency level rounded up to a power of two and never changes; each
/// stripe grows its own bucket array when it gets too full.
///
/// Stripes other than the first are created on the first insertion routed to
/// them, so a map with a high concurrency level stays small until it is used.
///
/// `HashMap` is `Send` and `Sync` when its keys and values are, and is usually
/// shared between threads with an `std::sync::Arc`.
///
/// By default, `HashMap` uses the hashing algorithm of
/// `std::collections::HashMap`, which resists HashDoS attacks. It can be
/// replaced with [`with_hasher`](#method.with_hasher) or
/// [`HashMapBuilder::build_with_hasher`][build-with-hasher]. Whatever the
/// hasher, its output is mixed again before it selects a stripe and a bucket.
///
/// It is required that the keys implement the [`Eq`] and [`Hash`] traits, and
/// that `k1 == k2` implies `hash(k1) == hash(k2)`. Panics raised by these
/// implementations unwind to the caller after the stripe lock is released.
///
/// # Examples
///
/// ```rust
/// use lockstripe::HashMap;
///
/// use std::{sync::Arc, thread};
///
/// let map = Arc::new(HashMap::new());
///
/// let threads: Vec<_> = (0..4u32)
///     .map(|t| {
///         let map = Arc::clone(&map);
///         thread::spawn(move || {
///             for i in 0..100 {
///                 map.insert(t * 100 + i, t);
///             }
///         })
///     })
///     .collect();
///
/// for t in threads {
///     t.join().unwrap();
/// }
///
/// assert_eq!(map.len(), 400);
/// assert_eq!(map.get(&250), Some(2));
/// ```
///
/// [build-with-hasher]: ./struct.HashMapBuilder.html#method.build_with_hasher
/// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
/// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
pub struct HashMap<K, V, S = DefaultHashBuilder> {
    stripes: StripeArray<K, V>,
    build_hasher: S,
}

impl<K, V> HashMap<K, V, DefaultHashBuilder> {
    /// Creates an empty map with 16 stripes, room for 16 entries and a load
    /// factor of 0.75.
    pub fn new() -> Self {
        Self::with_layout(Layout::default(), DefaultHashBuilder::default())
    }

    /// Creates an empty map with the default number of stripes, sized to hold
    /// `capacity` entries before any stripe grows.
    ///
    /// Use [`HashMapBuilder`][builder-struct] to pick the other parameters.
    ///
    /// [builder-struct]: ./struct.HashMapBuilder.html
    pub fn with_capacity(capacity: usize) -> Self {
        let default = Layout::default();
        let layout = builder_utils::shape(capacity, default.load_factor, default.num_stripes);
        Self::with_layout(layout, DefaultHashBuilder::default())
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty map with the default layout that uses `build_hasher` to
    /// hash the keys.
    pub fn with_hasher(build_hasher: S) -> Self {
        Self::with_layout(Layout::default(), build_hasher)
    }

    pub(crate) fn with_layout(layout: Layout, build_hasher: S) -> Self {
        let template = Stripe::new(layout.stripe_capacity, layout.load_factor);
        Self {
            stripes: StripeArray::new(layout.num_stripes, template),
            build_hasher,
        }
    }

    pub(crate) fn stripes(&self) -> &StripeArray<K, V> {
        &self.stripes
    }

    /// Returns the number of stripes. It never changes.
    pub fn num_stripes(&self) -> usize {
        self.stripes.len()
    }

    /// Returns the total length of the bucket arrays of the stripes created so
    /// far. Other threads may grow it at any time.
    pub fn capacity(&self) -> usize {
        self.stripes.existing().map(Stripe::capacity).sum()
    }

    /// Returns the number of entries in the map.
    ///
    /// The stripes are first counted without locking. If they keep changing
    /// during the count, every stripe is locked in turn and the count is taken
    /// while all of them are held.
    pub fn len(&self) -> usize {
        sizing::len(&self.stripes)
    }

    /// Returns `true` if the map contains no entries. Works like
    /// [`len`](#method.len) but stops at the first non-empty stripe.
    pub fn is_empty(&self) -> bool {
        sizing::is_empty(&self.stripes)
    }

    /// Returns `true` if some key maps to `value`. This scans the whole map.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        sizing::contains_value(&self.stripes, value)
    }

    /// Removes every entry.
    ///
    /// The stripes are cleared one after another, each under its own lock.
    /// Entries inserted into an already cleared stripe while this runs are
    /// kept.
    pub fn clear(&self) {
        for stripe in self.stripes.existing() {
            stripe.clear();
        }
    }

    /// Returns a weakly consistent iterator over clones of the entries.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter::new(self)
    }

    /// Returns a weakly consistent iterator over clones of the keys.
    pub fn keys(&self) -> Keys<'_, K, V, S> {
        Keys::new(self)
    }

    /// Returns a weakly consistent iterator over clones of the values.
    pub fn values(&self) -> Values<'_, K, V, S> {
        Values::new(self)
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Rebuilds a map from entries that were taken out of another map, e.g.
    /// after they were read back from storage.
    ///
    /// `num_stripes` and `load_factor` are the parameters of the original map.
    /// The stripes start with the smallest bucket arrays and grow while the
    /// entries are inserted.
    ///
    /// # Errors
    ///
    /// Returns `Error::CorruptedState` if `num_stripes` is zero, is not a power
    /// of two or is above 65,536, and `Error::InvalidArgument` if `load_factor`
    /// is not greater than zero.
    pub fn restore<I>(
        num_stripes: usize,
        load_factor: f32,
        build_hasher: S,
        entries: I,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let layout = match restored_layout(num_stripes, load_factor) {
            Ok(layout) => layout,
            Err(e) => {
                #[cfg(feature = "logging")]
                log::warn!("Refused to restore a map: {e}");
                return Err(e);
            }
        };

        let map = Self::with_layout(layout, build_hasher);
        map.insert_all(entries);
        Ok(map)
    }

    #[inline]
    fn hash<Q>(&self, key: &Q) -> u32
    where
        Q: Hash + ?Sized,
    {
        hash::hash(&self.build_hasher, key)
    }

    /// Returns a clone of the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, but [`Hash`] and
    /// [`Eq`] on the borrowed form *must* match those for the key type.
    ///
    /// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
    /// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get_and(key, |_, v| v.clone())
    }

    /// Returns the result of invoking `with_entry` with the key-value pair
    /// corresponding to the key. Nothing is locked while `with_entry` runs.
    #[inline]
    pub fn get_and<Q, F, T>(&self, key: &Q, with_entry: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&K, &V) -> T,
    {
        let hash = self.hash(key);
        self.stripes
            .stripe_for(hash)?
            .get_key_value_and(key, hash, with_entry)
    }

    /// Returns `true` if the map contains a value for the key.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        self.stripes
            .stripe_for(hash)
            .map_or(false, |s| s.contains_key(key, hash))
    }

    /// Inserts a key-value pair, returning a clone of the value it replaced.
    pub fn insert(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        self.insert_and(key, value, V::clone)
    }

    /// Inserts a key-value pair, returning the result of invoking `with_old_value`
    /// with the value it replaced.
    ///
    /// `with_old_value` runs while the stripe is locked.
    pub fn insert_and<F, T>(&self, key: K, value: V, with_old_value: F) -> Option<T>
    where
        F: FnOnce(&V) -> T,
    {
        let hash = self.hash(&key);
        self.stripes
            .ensure_for(hash)
            .insert_and(key, hash, value, false, with_old_value)
    }

    /// Inserts a key-value pair unless the key is already present.
    ///
    /// Returns `None` if the pair was inserted, otherwise a clone of the value
    /// that is already in the map. The existing value is left as it is.
    pub fn insert_if_absent(&self, key: K, value: V) -> Option<V>
    where
        V: Clone,
    {
        let hash = self.hash(&key);
        self.stripes
            .ensure_for(hash)
            .insert_and(key, hash, value, true, V::clone)
    }

    /// Inserts every pair of `entries`, as if by [`insert`](#method.insert).
    pub fn insert_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.insert_and(key, value, |_| ());
        }
    }

    /// Removes a key from the map, returning a clone of its value.
    #[inline]
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.remove_and(key, V::clone)
    }

    /// Removes a key from the map, returning the result of invoking
    /// `with_previous_value` with the removed value.
    pub fn remove_and<Q, F, T>(&self, key: &Q, with_previous_value: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&V) -> T,
    {
        let hash = self.hash(key);
        self.stripes
            .stripe_for(hash)?
            .remove_if_and(key, hash, |_, _| true, with_previous_value)
    }

    /// Removes a key from the map if `condition` returns `true` for its
    /// current entry, returning a clone of the removed value.
    ///
    /// `condition` runs while the stripe is locked.
    pub fn remove_if<Q, F>(&self, key: &Q, condition: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
        F: FnOnce(&K, &V) -> bool,
    {
        let hash = self.hash(key);
        self.stripes
            .stripe_for(hash)?
            .remove_if_and(key, hash, condition, V::clone)
    }

    /// Removes a key only if it currently maps to `value`. Returns `true` if
    /// the entry was removed.
    pub fn remove_if_eq<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let hash = self.hash(key);
        self.stripes.stripe_for(hash).map_or(false, |s| {
            s.remove_if_and(key, hash, |_, v| v == value, |_| ())
                .is_some()
        })
    }

    /// Replaces the value of a key only if the key is present, returning a
    /// clone of the replaced value.
    pub fn replace<Q>(&self, key: &Q, value: V) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let hash = self.hash(key);
        self.stripes
            .stripe_for(hash)?
            .replace_if_and(key, hash, value, |_| true, V::clone)
    }

    /// Replaces the value of a key only if it currently maps to `expected`.
    /// Returns `true` if the value was replaced.
    pub fn replace_if_eq<Q>(&self, key: &Q, expected: &V, value: V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: PartialEq,
    {
        let hash = self.hash(key);
        self.stripes.stripe_for(hash).map_or(false, |s| {
            s.replace_if_and(key, hash, value, |v| v == expected, |_| ())
                .is_some()
        })
    }
}

fn restored_layout(num_stripes: usize, load_factor: f32) -> Result<Layout, Error> {
    Ok(Layout {
        num_stripes: builder_utils::ensure_restored_stripes(num_stripes)?,
        stripe_capacity: MIN_STRIPE_TABLE_CAPACITY,
        load_factor: builder_utils::ensure_load_factor(load_factor)?,
    })
}

impl<K, V, S: Default> Default for HashMap<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Extend<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.insert_all(iter);
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::default();
        map.insert_all(iter);
        map
    }
}

impl<K, V, S> fmt::Debug for HashMap<K, V, S>
where
    K: fmt::Debug + Hash + Eq + Clone,
    V: fmt::Debug + Clone,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
