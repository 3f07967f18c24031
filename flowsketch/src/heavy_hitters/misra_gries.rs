//! Misra-Gries deterministic heavy-hitter summary
//!
//! The classic frequent-items summary (Misra & Gries, 1982), generalized to
//! weighted updates. At most `k` tracked entries; when a new key arrives
//! with the table full, either the incoming weight or the current minimum is
//! subtracted from every entry, whichever is smaller. The invariant is that
//! the tracked mass never exceeds the stream mass and any flow of true count
//! `> total / (k + 1)` is present.

use crate::common::{invalid_capacity, Counter, FlowKey, KeyedSketch, Result, Sketch};
use std::collections::BTreeMap;

/// Bounded map of at most `k` tracked flows with decrement-based eviction
///
/// # Examples
/// ```
/// use flowsketch::heavy_hitters::MisraGries;
/// use flowsketch::FlowKey;
///
/// let mut mg = MisraGries::<u64, 4>::new(2).unwrap();
/// for _ in 0..4 {
///     mg.update(&FlowKey::from(1u32), 1);
/// }
/// mg.update(&FlowKey::from(2u32), 1);
/// assert!(mg.heavy_hitters_lb(3).contains_key(&FlowKey::from(1u32)));
/// ```
#[derive(Clone, Debug)]
pub struct MisraGries<T, const N: usize> {
    capacity: usize,
    total: i64,
    entries: BTreeMap<FlowKey<N>, T>,
}

impl<T: Counter, const N: usize> MisraGries<T, N> {
    /// Build a summary tracking at most `capacity` flows
    ///
    /// # Errors
    /// Returns `InvalidCapacity` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(invalid_capacity("capacity", capacity, "must be > 0"));
        }
        Ok(Self {
            capacity,
            total: 0,
            entries: BTreeMap::new(),
        })
    }

    /// Maximum number of tracked flows
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total mass folded into the summary
    pub fn total(&self) -> i64 {
        self.total
    }

    /// Number of currently tracked flows
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no flow is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold a weighted update into the summary
    pub fn update(&mut self, key: &FlowKey<N>, val: T) {
        self.total += val.to_i64();
        if let Some(entry) = self.entries.get_mut(key) {
            *entry = entry.saturating_add(val);
            return;
        }
        if self.entries.len() < self.capacity {
            self.entries.insert(*key, val);
            return;
        }

        let min_val = self
            .entries
            .values()
            .copied()
            .min()
            .unwrap_or(T::ZERO);
        if val < min_val {
            // incoming weight smaller than every entry: charge it to all
            for entry in self.entries.values_mut() {
                *entry = entry.saturating_sub(val);
            }
        } else {
            // charge the minimum to all, evict the zeroed, keep the residue
            for entry in self.entries.values_mut() {
                *entry = entry.saturating_sub(min_val);
            }
            self.entries.retain(|_, v| *v > T::ZERO);
            let residue = val.saturating_sub(min_val);
            if residue > T::ZERO {
                self.entries.insert(*key, residue);
            }
        }
    }

    /// Tracked value of `key`, zero if untracked
    pub fn query(&self, key: &FlowKey<N>) -> T {
        self.entries.get(key).copied().unwrap_or(T::ZERO)
    }

    /// Entries whose tracked value alone reaches `threshold` (no false
    /// positives against the true counts)
    pub fn heavy_hitters_lb(&self, threshold: T) -> BTreeMap<FlowKey<N>, T> {
        self.entries
            .iter()
            .filter(|(_, &v)| v >= threshold)
            .map(|(k, &v)| (*k, v))
            .collect()
    }

    /// Entries whose tracked value plus the worst-case undercount
    /// `total / (k + 1)` reaches `threshold` (no false negatives)
    pub fn heavy_hitters_ub(&self, threshold: T) -> BTreeMap<FlowKey<N>, T> {
        let slack = self.total / (self.capacity as i64 + 1);
        self.entries
            .iter()
            .filter(|(_, &v)| v.to_i64() + slack >= threshold.to_i64())
            .map(|(k, &v)| (*k, v))
            .collect()
    }
}

impl<T: Counter, const N: usize> Sketch for MisraGries<T, N> {
    fn clear(&mut self) {
        self.total = 0;
        self.entries.clear();
    }

    fn byte_size(&self) -> usize {
        // estimated: map nodes at capacity, pointers excluded
        std::mem::size_of::<Self>()
            + self.capacity * (std::mem::size_of::<FlowKey<N>>() + std::mem::size_of::<T>())
    }
}

impl<T: Counter, const N: usize> KeyedSketch<T, N> for MisraGries<T, N> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        MisraGries::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        MisraGries::query(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: u32) -> FlowKey<4> {
        FlowKey::from(v)
    }

    #[test]
    fn test_mass_invariant_holds() {
        let mut mg = MisraGries::<u64, 4>::new(3).unwrap();
        for v in 0..100u32 {
            mg.update(&key(v % 10), (v % 4 + 1) as u64);
        }
        let tracked: i64 = mg.entries.values().map(|v| v.to_i64()).sum();
        assert!(tracked <= mg.total());
        assert!(mg.len() <= 3);
    }

    #[test]
    fn test_eviction_keeps_majority_flow() {
        let mut mg = MisraGries::<u64, 4>::new(2).unwrap();
        for _ in 0..60 {
            mg.update(&key(1), 1);
        }
        for v in 2..30u32 {
            mg.update(&key(v), 1);
        }
        assert!(mg.query(&key(1)) > 0);
    }

    #[test]
    fn test_weighted_eviction_residue() {
        let mut mg = MisraGries::<u64, 4>::new(2).unwrap();
        mg.update(&key(1), 5);
        mg.update(&key(2), 3);
        // table full; incoming 10 > min 3: evict 2, keep residue 7
        mg.update(&key(3), 10);
        assert_eq!(mg.query(&key(2)), 0);
        assert_eq!(mg.query(&key(3)), 7);
        assert_eq!(mg.query(&key(1)), 2);
    }

    #[test]
    fn test_small_weight_charges_everyone() {
        let mut mg = MisraGries::<u64, 4>::new(2).unwrap();
        mg.update(&key(1), 5);
        mg.update(&key(2), 4);
        mg.update(&key(3), 2); // 2 < min 4: decrement both, drop the update
        assert_eq!(mg.query(&key(1)), 3);
        assert_eq!(mg.query(&key(2)), 2);
        assert_eq!(mg.query(&key(3)), 0);
    }

    #[test]
    fn test_upper_bound_includes_slack() {
        let mut mg = MisraGries::<u64, 4>::new(1).unwrap();
        mg.update(&key(1), 10);
        mg.update(&key(2), 8); // evicts: entry 2 keeps residue 0? no: 8 < 10 charges
        let ub = mg.heavy_hitters_ub(10);
        // total 18, slack 9: remaining entry qualifies
        assert!(!ub.is_empty());
    }
}
