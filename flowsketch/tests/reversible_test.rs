//! Integration tests for the reversible sketches
//!
//! These sketches recover flow keys from table structure alone, so the
//! tests seed a heavy flow among background noise and check that the
//! decoders name it without being told.

use flowsketch::reversible::{Deltoid, FastSketch, LDSketch, MVSketch};
use flowsketch::{AwareHash, FlowKey, Sketch};
use proptest::prelude::*;

fn key(v: u32) -> FlowKey<4> {
    FlowKey::from(v)
}

// ============================================================================
// Deltoid
// ============================================================================

#[test]
fn test_deltoid_recovers_heavy_flows() {
    let mut d = Deltoid::<u64, AwareHash, 4>::with_seed(3, 64, 31).unwrap();
    let elephants = [key(0xdead_0001), key(0xdead_0002)];
    for e in &elephants {
        d.update(e, 5000);
    }
    for v in 0..200u32 {
        d.update(&key(v), 2);
    }
    let hitters = d.heavy_hitters(1000);
    for e in &elephants {
        assert!(hitters.contains_key(e), "elephant not recovered");
        assert!(*hitters.get(e).unwrap() >= 5000);
    }
}

#[test]
fn test_deltoid_heavy_changers_ignore_stable_flows() {
    let mut before = Deltoid::<u64, AwareHash, 4>::with_seed(3, 64, 33).unwrap();
    let mut after = before.clone();
    // stable heavy flow in both epochs, one surging flow
    before.update(&key(1), 3000);
    after.update(&key(1), 3000);
    after.update(&key(2), 4000);
    let changers = after.heavy_changers(1000, &before);
    assert!(changers.contains_key(&key(2)));
    assert!(!changers.contains_key(&key(1)));
}

#[test]
fn test_deltoid_wide_keys() {
    let mut d = Deltoid::<u64, AwareHash, 13>::with_seed(2, 32, 35).unwrap();
    let mut bytes = [0u8; 13];
    bytes[0] = 10;
    bytes[12] = 99;
    let wide = FlowKey::<13>::new(bytes);
    d.update(&wide, 700);
    let hitters = d.heavy_hitters(500);
    assert!(hitters.contains_key(&wide));
}

// ============================================================================
// FastSketch
// ============================================================================

#[test]
fn test_fast_sketch_recovers_multiple_heavies() {
    let mut fs = FastSketch::<u64, AwareHash, 4>::with_seed(256, 3, 41).unwrap();
    let heavies: Vec<FlowKey<4>> = (1..=4u32).map(|v| key(v * 0x0101_0101)).collect();
    for h in &heavies {
        fs.update(h, 2000);
    }
    for v in 0..100u32 {
        fs.update(&key(v), 1);
    }
    let hitters = fs.heavy_hitters(500);
    for h in &heavies {
        assert!(hitters.contains_key(h), "heavy flow missing from decode");
    }
}

#[test]
fn test_fast_sketch_merge_then_decode() {
    let base = FastSketch::<u64, AwareHash, 4>::with_seed(128, 2, 43).unwrap();
    let mut shard_a = base.clone();
    let mut shard_b = base.clone();
    shard_a.update(&key(0x5555_5555), 600);
    shard_b.update(&key(0x5555_5555), 600);
    let mut merged = base.clone();
    merged.merge([&shard_a, &shard_b]);
    let hitters = merged.heavy_hitters(1000);
    assert!(hitters.contains_key(&key(0x5555_5555)));
}

// ============================================================================
// LDSketch
// ============================================================================

#[test]
fn test_ld_sketch_heavy_hitters_and_bounds() {
    let mut ld = LDSketch::<u64, AwareHash, 4>::with_seed(3, 64, 500, 0.25, 47).unwrap();
    ld.update(&key(0xbeef), 2000);
    for v in 0..100u32 {
        ld.update(&key(v), 3);
    }
    let bounds = ld.query_bounds(&key(0xbeef));
    assert!(bounds.lower <= 2000);
    assert!(bounds.upper >= 2000);
    assert!(ld.heavy_hitters().contains_key(&key(0xbeef)));
}

proptest! {
    #[test]
    fn prop_ld_sketch_bounds_bracket_truth(
        updates in prop::collection::vec((0u32..16, 1u64..6), 1..100)
    ) {
        let mut ld = LDSketch::<u64, AwareHash, 4>::with_seed(2, 16, 50, 0.5, 49).unwrap();
        let mut truth = std::collections::HashMap::new();
        for (k, v) in &updates {
            ld.update(&key(*k), *v);
            *truth.entry(*k).or_insert(0u64) += v;
        }
        for (k, count) in truth {
            let bounds = ld.query_bounds(&key(k));
            prop_assert!(bounds.lower <= count);
            prop_assert!(bounds.upper >= count);
        }
    }
}

// ============================================================================
// MVSketch
// ============================================================================

#[test]
fn test_mv_sketch_upper_and_lower_bounds() {
    let mut mv = MVSketch::<i64, AwareHash, 4>::with_seed(3, 64, 53).unwrap();
    mv.update(&key(0xcafe), 1500);
    for v in 0..80u32 {
        mv.update(&key(v), 2);
    }
    let bounds = mv.query_bounds(&key(0xcafe));
    assert!(bounds.lower <= 1500);
    assert!(bounds.upper >= 1500);
    assert!(mv.heavy_hitters(1000).contains_key(&key(0xcafe)));
}

#[test]
fn test_mv_sketch_heavy_changers() {
    let mut before = MVSketch::<i64, AwareHash, 4>::with_seed(3, 64, 55).unwrap();
    let mut after = before.clone();
    before.update(&key(8), 100);
    after.update(&key(8), 2500);
    for v in 0..50u32 {
        before.update(&key(v + 100), 2);
        after.update(&key(v + 100), 2);
    }
    let changers = after.heavy_changers(1000, &before);
    assert!(changers.contains_key(&key(8)));
}

proptest! {
    #[test]
    fn prop_mv_sketch_never_underestimates(
        updates in prop::collection::vec((0u32..24, 1i64..5), 1..120)
    ) {
        let mut mv = MVSketch::<i64, AwareHash, 4>::with_seed(3, 32, 57).unwrap();
        let mut truth = std::collections::HashMap::new();
        for (k, v) in &updates {
            mv.update(&key(*k), *v);
            *truth.entry(*k).or_insert(0i64) += v;
        }
        for (k, count) in truth {
            prop_assert!(mv.query(&key(k)) >= count);
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_reversible_clear_empties_decoders() {
    let mut d = Deltoid::<u64, AwareHash, 4>::with_seed(2, 32, 61).unwrap();
    let mut fs = FastSketch::<u64, AwareHash, 4>::with_seed(64, 2, 61).unwrap();
    d.update(&key(1), 900);
    fs.update(&key(1), 900);
    d.clear();
    fs.clear();
    assert!(d.heavy_hitters(100).is_empty());
    assert!(fs.heavy_hitters(100).is_empty());
}
