//! A lock-striped hash table.
//!
//! The table divides its entries between a fixed, power-of-two number of
//! stripes. The most significant bits of a key's hash select its stripe and the
//! least significant bits select a bucket within the stripe's bucket array, so
//! entries never move between stripes.
//!
//! Each stripe owns a bucket array of singly linked chains and a lock. Readers
//! take no lock at all: they load the current bucket array and walk a chain,
//! relying on acquire loads of the chain links and values that writers store
//! with release semantics. Writers lock the stripe, which serializes all
//! mutations of that stripe while leaving the other stripes available.
//!
//! When a stripe holds more entries than its load factor allows, the writer that
//! pushed it over doubles its bucket array. Since the length is a power of two,
//! every chain splits into at most two chains. The longest tail of a chain whose
//! entries all land in the same new bucket is shared with the old array, and
//! only the entries in front of it are copied. Readers still walking the old
//! array keep seeing a complete snapshot of the stripe. Retired arrays and
//! unlinked entries are reclaimed once no reader can reach them.
//!
//! Whole-map queries, such as the number of entries, cannot lock the map as a
//! whole. They first scan the stripes optimistically and check that no stripe
//! was modified meanwhile, falling back to locking every stripe if they keep
//! racing with writers.
//!
//! The design follows the [`ConcurrentHashMap`] from OpenJDK 7, which consists
//! of a number of separately-locked segments.
//!
//! [`ConcurrentHashMap`]: https://github.com/openjdk-mirror/jdk7u-jdk/blob/master/src/share/classes/java/util/concurrent/ConcurrentHashMap.java

pub(crate) mod entry;
pub(crate) mod hash;
pub(crate) mod iter;
pub(crate) mod map;
pub(crate) mod sizing;
pub(crate) mod stripe;
pub(crate) mod stripe_array;

#[cfg(test)]
#[macro_use]
pub(crate) mod test_util;

pub use iter::{Iter, Keys, Values};
pub use map::{DefaultHashBuilder, HashMap};
