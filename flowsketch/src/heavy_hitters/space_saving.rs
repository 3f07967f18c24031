//! Space-Saving heavy-hitter summary
//!
//! Space-Saving (Metwally, Agrawal & El Abbadi, 2005) keeps exactly `k`
//! candidate flows. A miss with a full table takes over the entry with the
//! minimum value, inheriting that minimum as error headroom: stored values
//! never undercount a flow that was ever inserted.

use crate::common::{invalid_capacity, Counter, FlowKey, KeyedSketch, Result, Sketch};
use std::collections::BTreeMap;

/// Fixed-capacity candidate table with min-replacement
///
/// # Examples
/// ```
/// use flowsketch::heavy_hitters::SpaceSaving;
/// use flowsketch::FlowKey;
///
/// let mut ss = SpaceSaving::<u64, 4>::new(8).unwrap();
/// ss.update(&FlowKey::from(1u32), 5);
/// assert!(ss.query(&FlowKey::from(1u32)) >= 5);
/// ```
#[derive(Clone, Debug)]
pub struct SpaceSaving<T, const N: usize> {
    capacity: usize,
    entries: BTreeMap<FlowKey<N>, T>,
}

impl<T: Counter, const N: usize> SpaceSaving<T, N> {
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
            entries: BTreeMap::new(),
        })
    }

    /// Maximum number of tracked flows
    pub fn capacity(&self) -> usize {
        self.capacity
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
        if let Some(entry) = self.entries.get_mut(key) {
            *entry = entry.saturating_add(val);
            return;
        }
        if self.entries.len() < self.capacity {
            self.entries.insert(*key, val);
            return;
        }
        // take over the minimum entry, inheriting its value as error slack
        let (min_key, min_val) = self
            .entries
            .iter()
            .min_by_key(|(_, &v)| v)
            .map(|(k, &v)| (*k, v))
            .expect("capacity > 0 keeps the table non-empty");
        self.entries.remove(&min_key);
        self.entries.insert(*key, val.saturating_add(min_val));
    }

    /// Stored value of `key`, zero if untracked; overestimates tracked flows
    pub fn query(&self, key: &FlowKey<N>) -> T {
        self.entries.get(key).copied().unwrap_or(T::ZERO)
    }

    /// Entries whose stored value reaches `threshold`
    pub fn heavy_hitters(&self, threshold: T) -> BTreeMap<FlowKey<N>, T> {
        self.entries
            .iter()
            .filter(|(_, &v)| v >= threshold)
            .map(|(k, &v)| (*k, v))
            .collect()
    }
}

impl<T: Counter, const N: usize> Sketch for SpaceSaving<T, N> {
    fn clear(&mut self) {
        self.entries.clear();
    }

    fn byte_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.capacity * (std::mem::size_of::<FlowKey<N>>() + std::mem::size_of::<T>())
    }
}

impl<T: Counter, const N: usize> KeyedSketch<T, N> for SpaceSaving<T, N> {
    fn update(&mut self, key: &FlowKey<N>, val: T) {
        SpaceSaving::update(self, key, val);
    }

    fn query(&self, key: &FlowKey<N>) -> T {
        SpaceSaving::query(self, key)
    }
}
