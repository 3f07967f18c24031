//! Integration tests for the decodable sketches

use flowsketch::decodable::{CounterBraids, FlowRadar, LayerConfig};
use flowsketch::{AwareHash, FlowKey, Sketch};

fn key(v: u32) -> FlowKey<4> {
    FlowKey::from(v)
}

// ============================================================================
// FlowRadar
// ============================================================================

#[test]
fn test_flow_radar_sparse_exact_decode() {
    // n_arr=101, nhash_arr=4, ten flows of size 7 decode exactly
    let mut fr = FlowRadar::<u64, AwareHash, 4>::with_seed(4096, 4, 101, 4, 1).unwrap();
    for v in 1..=10u32 {
        fr.update(&key(v), 7);
    }
    let decoded = fr.decode();
    assert_eq!(decoded.len(), 10);
    for v in 1..=10u32 {
        assert_eq!(decoded.get(&key(v)).copied(), Some(7));
    }
}

#[test]
fn test_flow_radar_decodes_across_seeds() {
    // cells/flows = 2 * nhash keeps the hypergraph peelable w.h.p.
    let mut full = 0;
    for seed in 1..=5u64 {
        let mut fr = FlowRadar::<u64, AwareHash, 4>::with_seed(8192, 4, 160, 4, seed).unwrap();
        for v in 1..=20u32 {
            fr.update(&key(v), u64::from(v));
        }
        let decoded = fr.decode();
        if decoded.len() == 20 && (1..=20u32).all(|v| decoded.get(&key(v)) == Some(&u64::from(v)))
        {
            full += 1;
        }
    }
    assert!(full >= 4, "only {}/5 seeds decoded fully", full);
}

#[test]
fn test_flow_radar_mixed_sizes() {
    let mut fr = FlowRadar::<u64, AwareHash, 4>::with_seed(4096, 4, 211, 4, 3).unwrap();
    for v in 1..=15u32 {
        for _ in 0..v {
            fr.update(&key(v), 10);
        }
    }
    let decoded = fr.decode();
    for v in 1..=15u32 {
        assert_eq!(decoded.get(&key(v)).copied(), Some(u64::from(v) * 10));
    }
}

// ============================================================================
// Counter Braids
// ============================================================================

fn braids(seed: u64) -> CounterBraids<AwareHash, 4> {
    let layers = [LayerConfig::new(1024, 8, 3), LayerConfig::new(128, 16, 2)];
    CounterBraids::with_seed(&layers, seed).unwrap()
}

#[test]
fn test_counter_braids_exact_for_light_flows() {
    let mut cb = braids(1);
    for v in 0..50u32 {
        cb.update(&key(v), u64::from(v % 9 + 1));
    }
    let decoded = cb.decode(10);
    assert_eq!(decoded.len(), 50);
    for v in 0..50u32 {
        assert_eq!(decoded.get(&key(v)).copied(), Some(i64::from(v % 9 + 1)));
    }
}

#[test]
fn test_counter_braids_decodes_overflowing_flows() {
    let mut cb = braids(2);
    // counts past the 8-bit layer-0 width must climb into layer 1 and back
    cb.update(&key(1), 700);
    cb.update(&key(2), 1300);
    for v in 10..40u32 {
        cb.update(&key(v), 3);
    }
    let decoded = cb.decode(12);
    assert_eq!(decoded.get(&key(1)).copied(), Some(700));
    assert_eq!(decoded.get(&key(2)).copied(), Some(1300));
}

#[test]
fn test_counter_braids_rejects_bad_layers() {
    assert!(CounterBraids::<AwareHash, 4>::with_seed(&[], 1).is_err());
    let zero_hash = [LayerConfig::new(64, 8, 0)];
    assert!(CounterBraids::<AwareHash, 4>::with_seed(&zero_hash, 1).is_err());
    let wide = [LayerConfig::new(64, 64, 2)];
    assert!(CounterBraids::<AwareHash, 4>::with_seed(&wide, 1).is_err());
}

#[test]
fn test_counter_braids_byte_size_counts_layers() {
    let cb = braids(1);
    // layer 0: >=1024 one-byte counters plus status bits
    assert!(cb.byte_size() > 1024);
}
