//! Counter Braids: layered counters decoded by message passing
//!
//! Counter Braids (Lu et al., SIGMETRICS 2008) braids a cascade of counter
//! layers. Layer 0 counters are addressed by hashes of flow keys; each deeper
//! layer is addressed by hashes of the previous layer's counter indices and
//! absorbs its carries. Counters are only a few bits wide, so the heavy mass
//! climbs the cascade while a status bit records that a counter ever
//! overflowed. Per-flow counts are not readable online; an offline
//! message-passing pass over the layer graphs reconstructs them.
//!
//! Decoding runs the iterative min/max algorithm: forward messages carry
//! per-counter residuals, backward updates set each estimate alternately to
//! the minimum and maximum of its incoming messages, and the final answer
//! averages the last iterate with the one before it. The decode is total but
//! may settle on a partial solution when the graph does not converge.

use crate::common::table::BitCounterTable;
use crate::common::{
    with_process_rng, FlowHasher, FlowKey, HashFamily, Result, SeededHasher, Sketch, SketchError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasherDefault;
use twox_hash::XxHash64;

type FlowMap<const N: usize> = HashMap<FlowKey<N>, i64, BuildHasherDefault<XxHash64>>;

/// Per-layer shape of a [`CounterBraids`] cascade
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerConfig {
    /// Number of counters in the layer (rounded up to the next prime)
    pub counters: usize,
    /// Counter width in bits
    pub bits: usize,
    /// Hash functions addressing the layer
    pub hashes: usize,
}

impl LayerConfig {
    /// Convenience constructor
    pub const fn new(counters: usize, bits: usize, hashes: usize) -> Self {
        Self {
            counters,
            bits,
            hashes,
        }
    }
}

/// Braided counter cascade with offline message-passing decoding
///
/// # Examples
/// ```
/// use flowsketch::decodable::{CounterBraids, LayerConfig};
/// use flowsketch::{AwareHash, FlowKey};
///
/// let layers = [LayerConfig::new(1024, 8, 3), LayerConfig::new(64, 16, 2)];
/// let mut cb = CounterBraids::<AwareHash, 4>::with_seed(&layers, 1).unwrap();
/// for v in 0..20u32 {
///     cb.update(&FlowKey::<4>::from(v), 3);
/// }
/// let decoded = cb.decode(8);
/// assert_eq!(decoded.len(), 20);
/// ```
#[derive(Clone, Debug)]
pub struct CounterBraids<H, const N: usize> {
    layers: Vec<BitCounterTable>,
    hash_layers: Vec<HashFamily<H>>,
    flow_map: FlowMap<N>,
}

impl<H: SeededHasher, const N: usize> CounterBraids<H, N> {
    /// Build a cascade seeded from the process-wide PRNG
    ///
    /// Counter counts are rounded up to the next prime per layer.
    ///
    /// # Errors
    /// Returns `InconsistentLayers` for an empty configuration and
    /// `InvalidCapacity` for a layer with zero counters, zero hashes, or an
    /// unsupported bit width.
    pub fn new(layers: &[LayerConfig]) -> Result<Self> {
        with_process_rng(|rng| Self::with_rng(layers, rng))
    }

    /// Build a cascade with a private deterministic seed
    pub fn with_seed(layers: &[LayerConfig], seed: u64) -> Result<Self> {
        Self::with_rng(layers, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a cascade drawing hash state from `rng`
    pub fn with_rng<R: Rng + ?Sized>(layers: &[LayerConfig], rng: &mut R) -> Result<Self> {
        if layers.is_empty() {
            return Err(SketchError::InconsistentLayers {
                reason: "at least one layer is required".to_string(),
            });
        }
        let mut tables = Vec::with_capacity(layers.len());
        let mut hash_layers = Vec::with_capacity(layers.len());
        for layer in layers {
            if layer.counters == 0 {
                return Err(crate::common::invalid_capacity(
                    "cntno",
                    layer.counters,
                    "must be > 0",
                ));
            }
            let counters = crate::common::util::next_prime(layer.counters);
            tables.push(BitCounterTable::new(counters, layer.bits)?);
            hash_layers.push(HashFamily::with_rng(layer.hashes, rng)?);
        }
        Ok(Self {
            layers: tables,
            hash_layers,
            flow_map: FlowMap::default(),
        })
    }

    /// Number of layers in the cascade
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Number of distinct flows seen since the last clear
    pub fn num_flows(&self) -> usize {
        self.flow_map.len()
    }

    /// Fold a weighted update into layer 0, propagating carries upward
    pub fn update(&mut self, key: &FlowKey<N>, val: u64) {
        self.flow_map.entry(*key).or_insert(0);
        for i in 0..self.hash_layers[0].len() {
            let idx = (self.hash_layers[0][i].hash_key(key) % self.layers[0].count() as u64)
                as usize;
            self.update_layer(0, idx, val);
        }
    }

    fn update_layer(&mut self, layer: usize, cnt: usize, val: u64) {
        let carry = self.layers[layer].add(cnt, val);
        if carry == 0 || layer == self.layers.len() - 1 {
            // the last layer never propagates; its overflows saturate decode
            return;
        }
        let next_count = self.layers[layer + 1].count() as u64;
        for i in 0..self.hash_layers[layer + 1].len() {
            let idx = (self.hash_layers[layer + 1][i].hash_u32(cnt as u32) % next_count) as usize;
            self.update_layer(layer + 1, idx, carry);
        }
    }

    /// Per-flow count decoded earlier, zero for unknown keys
    pub fn count(&self, key: &FlowKey<N>) -> i64 {
        self.flow_map.get(key).copied().unwrap_or(0)
    }

    /// Decode per-flow counts with `iters` message-passing rounds per layer
    ///
    /// Walks from the top layer down, reconstructing each layer's true
    /// counter values from the next layer's decoded carries, then decodes the
    /// flow-to-counter layer the same way. Results are stored in the flow
    /// map and returned. The decode never fails; an unconverged graph yields
    /// approximate counts.
    pub fn decode(&mut self, iters: usize) -> BTreeMap<FlowKey<N>, i64> {
        let top = self.layers.len() - 1;
        let mut cnt: Vec<i64> = (0..self.layers[top].count())
            .map(|i| self.layers[top].get(i) as i64)
            .collect();

        for layer in (0..top).rev() {
            let mut est = self.decode_layer(layer, iters, &cnt);
            let nonzero = est.iter().filter(|&&e| e != 0).count();
            log::debug!(
                "counter braids layer {}: {} of {} counters carried",
                layer,
                nonzero,
                est.len()
            );
            for (i, e) in est.iter_mut().enumerate() {
                *e = (*e << self.layers[layer].bits()) + self.layers[layer].get(i) as i64;
            }
            cnt = est;
        }

        self.decode_flows(iters, &cnt);
        self.flow_map.iter().map(|(k, &v)| (*k, v)).collect()
    }

    /// Decode the counter-to-counter transition out of `layer`
    fn decode_layer(&self, layer: usize, iters: usize, cnt: &[i64]) -> Vec<i64> {
        let lsize = self.layers[layer].count();
        let rsize = self.layers[layer + 1].count();
        let mut left: Vec<HashMap<usize, i64>> = vec![HashMap::new(); lsize];
        let mut right: Vec<Vec<usize>> = vec![Vec::new(); rsize];

        for i in 0..lsize {
            if !self.layers[layer].status(i) {
                continue;
            }
            for j in 0..self.hash_layers[layer + 1].len() {
                let k = (self.hash_layers[layer + 1][j].hash_u32(i as u32) % rsize as u64) as usize;
                left[i].insert(k, 0);
                right[k].push(i);
            }
        }
        message_passing(cnt, &mut left, &right, iters)
    }

    /// Decode the flow-to-counter layer into the flow map
    fn decode_flows(&mut self, iters: usize, cnt: &[i64]) {
        let keys: Vec<FlowKey<N>> = self.flow_map.keys().copied().collect();
        let rsize = self.layers[0].count();
        let mut left: Vec<HashMap<usize, i64>> = vec![HashMap::new(); keys.len()];
        let mut right: Vec<Vec<usize>> = vec![Vec::new(); rsize];

        for (i, key) in keys.iter().enumerate() {
            for j in 0..self.hash_layers[0].len() {
                let k = (self.hash_layers[0][j].hash_key(key) % rsize as u64) as usize;
                left[i].insert(k, 0);
                right[k].push(i);
            }
        }
        let est = message_passing(cnt, &mut left, &right, iters);
        for (key, count) in keys.iter().zip(est) {
            self.flow_map.insert(*key, count);
        }
    }
}

/// Iterative min/max message passing over a bipartite residual graph
///
/// `left[i]` maps right-vertex index to the latest message on that edge;
/// `right[j]` lists the left vertices attached to counter `j` with value
/// `cnt[j]`. After `iters` rounds the estimates are averaged with the
/// previous iterate to damp the min/max oscillation.
fn message_passing(
    cnt: &[i64],
    left: &mut [HashMap<usize, i64>],
    right: &[Vec<usize>],
    iters: usize,
) -> Vec<i64> {
    let mut est = vec![0i64; left.len()];
    let mut penultimate = vec![0i64; left.len()];

    for it in 1..=iters {
        // forward: each counter distributes its residual over its edges
        for (j, attached) in right.iter().enumerate() {
            let acc: i64 = attached.iter().map(|&k| est[k]).sum();
            let residual = cnt[j] - acc;
            for &k in attached {
                left[k].insert(j, (residual + est[k]).max(1));
            }
        }
        // backward: alternate between the most and least optimistic message
        for (j, edges) in left.iter().enumerate() {
            est[j] = if edges.is_empty() {
                0
            } else if it % 2 == 1 {
                *edges.values().min().expect("non-empty")
            } else {
                *edges.values().max().expect("non-empty")
            };
        }
        if it == iters.saturating_sub(1) {
            penultimate.copy_from_slice(&est);
        }
    }

    for (e, p) in est.iter_mut().zip(penultimate) {
        *e = (*e + p) / 2;
    }
    est
}

impl<H: SeededHasher, const N: usize> Sketch for CounterBraids<H, N> {
    fn clear(&mut self) {
        for layer in &mut self.layers {
            layer.clear();
        }
        self.flow_map.clear();
    }

    fn byte_size(&self) -> usize {
        let layers: usize = self.layers.iter().map(BitCounterTable::heap_bytes).sum();
        let hashes: usize = self.hash_layers.iter().map(HashFamily::byte_size).sum();
        std::mem::size_of::<Self>() + layers + hashes
    }
}
