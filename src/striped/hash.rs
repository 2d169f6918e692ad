use std::hash::{BuildHasher, Hash, Hasher};

/// Hashes `key` with the map's `BuildHasher` and spreads the result to 32 bits.
///
/// The `BuildHasher` carries the per-map random seed (`RandomState` by default),
/// so two maps route the same key differently.
pub(crate) fn hash<K, H>(build_hasher: &H, key: &K) -> u32
where
    K: ?Sized + Hash,
    H: BuildHasher,
{
    let mut hasher = build_hasher.build_hasher();
    key.hash(&mut hasher);
    let h = hasher.finish();

    spread((h ^ (h >> 32)) as u32)
}

/// A variant of the single-word Wang/Jenkins hash.
///
/// Stripes are picked with the upper bits of the result and buckets with the
/// lower bits, so both ends must be well mixed even when the input hash only
/// varies in a few bits.
#[inline]
pub(crate) fn spread(mut h: u32) -> u32 {
    h = h.wrapping_add((h << 15) ^ 0xffff_cd7d);
    h ^= h >> 10;
    h = h.wrapping_add(h << 3);
    h ^= h >> 6;
    h = h.wrapping_add((h << 2).wrapping_add(h << 14));
    h ^ (h >> 16)
}

#[cfg(test)]
mod tests {
    use super::{hash, spread};
    use std::collections::{hash_map::RandomState, HashSet};

    #[test]
    fn spread_is_deterministic() {
        for h in [0, 1, 2, 0xdead_beef, u32::MAX] {
            assert_eq!(spread(h), spread(h));
        }
        assert_ne!(spread(1), spread(2));
    }

    #[test]
    fn spread_mixes_high_and_low_bits() {
        // Inputs that differ only above bit 16 must still land in many
        // different low-order buckets, and inputs that differ only in the low
        // bits must land in many different high-order stripes.
        let low: HashSet<_> = (0u32..256).map(|i| spread(i << 16) & 0xff).collect();
        assert!(low.len() > 64, "only {} distinct buckets", low.len());

        let high: HashSet<_> = (0u32..256).map(|i| spread(i) >> 24).collect();
        assert!(high.len() > 64, "only {} distinct stripes", high.len());
    }

    #[test]
    fn hash_uses_build_hasher() {
        let s = RandomState::new();
        assert_eq!(hash(&s, "foo"), hash(&s, "foo"));
        assert_eq!(hash(&s, &42u64), hash(&s, &42u64));
    }
}
