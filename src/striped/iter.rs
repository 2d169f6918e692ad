use super::map::HashMap;
use crate::common::error::Error;

use std::{
    hash::{BuildHasher, Hash},
    vec,
};

/// An iterator over the entries of a [`HashMap`][map-struct], yielding clones
/// of the keys and values.
///
/// The iterator is weakly consistent. It visits one stripe at a time and copies
/// the entries of a stripe when it reaches it, so it yields every entry that is
/// present from its creation to its end, never yields a key twice, and may or
/// may not yield entries inserted or removed while it runs. Concurrent writes
/// never make it fail.
///
/// [map-struct]: ./struct.HashMap.html
pub struct Iter<'a, K, V, S> {
    map: &'a HashMap<K, V, S>,
    next_stripe: usize,
    current: vec::IntoIter<(K, V)>,
    last_key: Option<K>,
}

impl<'a, K, V, S> Iter<'a, K, V, S> {
    pub(crate) fn new(map: &'a HashMap<K, V, S>) -> Self {
        Self {
            map,
            next_stripe: 0,
            current: Vec::new().into_iter(),
            last_key: None,
        }
    }
}

impl<'a, K, V, S> Iter<'a, K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    /// Removes the entry of the key that was yielded last, returning its
    /// current value if it is still in the map.
    ///
    /// Returns `Err(Error::NoCurrentEntry)` if nothing has been yielded yet or
    /// if `remove` has already been called for the last yielded entry.
    pub fn remove(&mut self) -> Result<Option<V>, Error> {
        let key = self.last_key.take().ok_or(Error::NoCurrentEntry)?;
        Ok(self.map.remove(&key))
    }

    /// Sets the value of the key that was yielded last, the same way
    /// [`HashMap::insert`][insert] does, and returns the value it replaced. If
    /// the key was removed from the map since it was yielded, it is inserted
    /// again.
    ///
    /// Returns `Err(Error::NoCurrentEntry)` if nothing has been yielded yet or
    /// if the last yielded entry was removed through this iterator.
    ///
    /// [insert]: ./struct.HashMap.html#method.insert
    pub fn set_value(&mut self, value: V) -> Result<Option<V>, Error> {
        let key = self.last_key.as_ref().ok_or(Error::NoCurrentEntry)?;
        Ok(self.map.insert(key.clone(), value))
    }

    fn advance(&mut self) -> Option<(K, V)> {
        loop {
            if let Some(entry) = self.current.next() {
                return Some(entry);
            }

            let stripes = self.map.stripes();
            if self.next_stripe >= stripes.len() {
                return None;
            }

            let index = self.next_stripe;
            self.next_stripe += 1;

            if let Some(stripe) = stripes.get(index) {
                let mut entries = Vec::with_capacity(stripe.count());
                stripe.for_each_entry(|k, v| {
                    entries.push((k.clone(), v.clone()));
                    true
                });
                self.current = entries.into_iter();
            }
        }
    }
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self.advance()?;
        self.last_key = Some(key.clone());
        Some((key, value))
    }
}

/// An iterator over the keys of a [`HashMap`][map-struct]. See [`Iter`] for
/// its consistency guarantees.
///
/// [map-struct]: ./struct.HashMap.html
pub struct Keys<'a, K, V, S>(Iter<'a, K, V, S>);

impl<'a, K, V, S> Keys<'a, K, V, S> {
    pub(crate) fn new(map: &'a HashMap<K, V, S>) -> Self {
        Self(Iter::new(map))
    }
}

impl<'a, K, V, S> Keys<'a, K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    /// Removes the key that was yielded last. See [`Iter::remove`].
    pub fn remove(&mut self) -> Result<Option<V>, Error> {
        self.0.remove()
    }
}

impl<'a, K, V, S> Iterator for Keys<'a, K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    type Item = K;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, _)| k)
    }
}

/// An iterator over the values of a [`HashMap`][map-struct]. See [`Iter`] for
/// its consistency guarantees.
///
/// [map-struct]: ./struct.HashMap.html
pub struct Values<'a, K, V, S>(Iter<'a, K, V, S>);

impl<'a, K, V, S> Values<'a, K, V, S> {
    pub(crate) fn new(map: &'a HashMap<K, V, S>) -> Self {
        Self(Iter::new(map))
    }
}

impl<'a, K, V, S> Values<'a, K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    /// Removes the entry whose value was yielded last. See [`Iter::remove`].
    pub fn remove(&mut self) -> Result<Option<V>, Error> {
        self.0.remove()
    }
}

impl<'a, K, V, S> Iterator for Values<'a, K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, HashMap, HashMapBuilder};

    use std::collections::HashSet;

    fn small_map(n: u32) -> HashMap<u32, String> {
        let map = HashMapBuilder::new()
            .concurrency_level(4)
            .build()
            .expect("valid configuration");
        for i in 0..n {
            map.insert(i, i.to_string());
        }
        map
    }

    #[test]
    fn yields_every_entry_once() {
        let map = small_map(500);

        let mut seen = HashSet::new();
        for (k, v) in map.iter() {
            assert_eq!(v, k.to_string());
            assert!(seen.insert(k), "duplicate key {k}");
        }
        assert_eq!(seen, (0..500).collect());

        assert_eq!(map.keys().collect::<HashSet<_>>(), seen);
        let mut values = map.values().collect::<Vec<_>>();
        values.sort_by_key(|v| v.parse::<u32>().ok());
        assert_eq!(values.first().map(String::as_str), Some("0"));
        assert_eq!(values.len(), 500);
    }

    #[test]
    fn empty_map() {
        let map = HashMap::<u32, u32>::new();
        assert_eq!(map.iter().next(), None);
        assert_eq!(map.keys().count(), 0);
        assert_eq!(map.values().count(), 0);
    }

    #[test]
    fn remove_through_iterator() {
        let map = small_map(100);

        let mut iter = map.iter();
        assert_eq!(iter.remove(), Err(Error::NoCurrentEntry));

        let mut removed = 0;
        while let Some((k, v)) = iter.next() {
            if k % 2 == 0 {
                assert_eq!(iter.remove(), Ok(Some(v)));
                assert_eq!(iter.remove(), Err(Error::NoCurrentEntry));
                removed += 1;
            }
        }

        assert_eq!(removed, 50);
        assert_eq!(map.len(), 50);
        assert!(map.keys().all(|k| k % 2 == 1));
    }

    #[test]
    fn remove_of_entry_removed_elsewhere() {
        let map = small_map(10);

        let mut keys = map.keys();
        let k = keys.next().expect("map is not empty");
        assert_eq!(map.remove(&k), Some(k.to_string()));
        assert_eq!(keys.remove(), Ok(None));

        let mut values = map.values();
        values.next();
        assert!(matches!(values.remove(), Ok(Some(_))));
        assert_eq!(map.len(), 8);
    }

    #[test]
    fn set_value_through_iterator() {
        let map = small_map(20);

        let mut iter = map.iter();
        assert_eq!(iter.set_value("x".into()), Err(Error::NoCurrentEntry));

        while let Some((k, v)) = iter.next() {
            assert_eq!(iter.set_value(format!("{k}!")), Ok(Some(v)));
            if k == 3 {
                assert_eq!(iter.remove(), Ok(Some("3!".to_string())));
                assert_eq!(iter.set_value("x".into()), Err(Error::NoCurrentEntry));
            }
        }

        assert_eq!(map.len(), 19);
        assert!(map.values().all(|v| v.ends_with('!')));

        // A key removed by someone else is inserted again.
        let mut entries = map.iter();
        let (k, _) = entries.next().expect("map is not empty");
        map.remove(&k);
        assert_eq!(entries.set_value("back".into()), Ok(None));
        assert_eq!(map.get(&k), Some("back".to_string()));
    }
}
