//! Integration tests for the frequency sketches
//!
//! Covers the one-sided Count-Min guarantee, the conservative-update
//! domination property, the CountSketch/K-ary median estimators, and the
//! MRAC distribution output.

use flowsketch::frequency::{ConservativeCountMin, CountMinSketch, CountSketch, KarySketch, Mrac};
use flowsketch::{AwareHash, FlowKey, MurmurHash, Sketch};
use proptest::prelude::*;
use std::collections::HashMap;

fn key(v: u32) -> FlowKey<4> {
    FlowKey::from(v)
}

// ============================================================================
// Count-Min
// ============================================================================

#[test]
fn test_count_min_bound_scenario() {
    // depth=4, width=256, stream [(A,10), (B,1), (A,3)]
    let mut cm = CountMinSketch::<u32, AwareHash>::with_seed(4, 256, 42).unwrap();
    let a = key(0xA);
    let b = key(0xB);
    let c = key(0xC);
    cm.update(&a, 10);
    cm.update(&b, 1);
    cm.update(&a, 3);

    assert!(cm.query(&a) >= 13);
    // an unseen key can only collide into the stream mass
    assert!(cm.query(&c) <= 14);
}

#[test]
fn test_count_min_works_with_murmur() {
    let mut cm = CountMinSketch::<u64, MurmurHash>::with_seed(4, 128, 7).unwrap();
    cm.update(&key(1), 5);
    assert!(cm.query(&key(1)) >= 5);
}

proptest! {
    #[test]
    fn prop_count_min_never_underestimates(
        updates in prop::collection::vec((0u32..64, 1u32..16), 1..200)
    ) {
        let mut cm = CountMinSketch::<u32, AwareHash>::with_seed(3, 64, 99).unwrap();
        let mut truth: HashMap<u32, u32> = HashMap::new();
        for (k, v) in &updates {
            cm.update(&key(*k), *v);
            *truth.entry(*k).or_insert(0) += v;
        }
        for (k, count) in truth {
            prop_assert!(cm.query(&key(k)) >= count);
        }
    }

    #[test]
    fn prop_conservative_update_dominated_by_count_min(
        updates in prop::collection::vec((0u32..64, 1u32..16), 1..200)
    ) {
        // identical seeds give identical hash layouts
        let mut cm = CountMinSketch::<u32, AwareHash>::with_seed(3, 32, 5).unwrap();
        let mut cu = ConservativeCountMin::<u32, AwareHash>::with_seed(3, 32, 5).unwrap();
        let mut truth: HashMap<u32, u32> = HashMap::new();
        for (k, v) in &updates {
            cm.update(&key(*k), *v);
            cu.update(&key(*k), *v);
            *truth.entry(*k).or_insert(0) += v;
        }
        for (k, count) in truth {
            let cu_est = cu.query(&key(k));
            prop_assert!(cu_est >= count);
            prop_assert!(cu_est <= cm.query(&key(k)));
        }
    }
}

// ============================================================================
// CountSketch and K-ary
// ============================================================================

#[test]
fn test_count_sketch_estimates_heavy_flow() {
    let mut cs = CountSketch::<i64, AwareHash>::with_seed(5, 256, 11).unwrap();
    for _ in 0..500 {
        cs.update(&key(1), 1);
    }
    for v in 10..60u32 {
        cs.update(&key(v), 1);
    }
    let est = cs.query(&key(1));
    assert!((450..=550).contains(&est), "estimate {} off", est);
}

#[test]
fn test_kary_background_correction() {
    let mut kary = KarySketch::<i64, AwareHash>::with_seed(5, 1024, 13).unwrap();
    for _ in 0..2000 {
        kary.update(&key(7), 1);
    }
    for v in 100..1100u32 {
        kary.update(&key(v), 1);
    }
    let est = kary.query(&key(7));
    assert!((1700..=2300).contains(&est), "estimate {} off", est);
}

// ============================================================================
// MRAC
// ============================================================================

#[test]
fn test_mrac_distribution_reflects_flow_sizes() {
    let mut mrac = Mrac::<u32, AwareHash>::with_seed(4096, 17).unwrap();
    // 100 flows of size 1, 10 flows of size 5
    for v in 0..100u32 {
        mrac.update(&key(v));
    }
    for v in 1000..1010u32 {
        for _ in 0..5 {
            mrac.update(&key(v));
        }
    }
    let dist = mrac.estimate_distribution();
    let ones = dist.get(&1).copied().unwrap_or(0.0);
    let fives = dist.get(&5).copied().unwrap_or(0.0);
    assert!(ones > fives, "size-1 buckets must dominate size-5 buckets");
    let total: f64 = dist.values().sum();
    assert!((total - 1.0).abs() < 1e-9);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_clear_restores_empty_estimates() {
    let mut cm = CountMinSketch::<u32, AwareHash>::with_seed(4, 64, 3).unwrap();
    let mut cu = ConservativeCountMin::<u32, AwareHash>::with_seed(4, 64, 3).unwrap();
    for v in 0..50u32 {
        cm.update(&key(v), 2);
        cu.update(&key(v), 2);
    }
    cm.clear();
    cu.clear();
    for v in 0..50u32 {
        assert_eq!(cm.query(&key(v)), 0);
        assert_eq!(cu.query(&key(v)), 0);
    }
}

#[test]
fn test_byte_size_reports_footprint() {
    let cm = CountMinSketch::<u32, AwareHash>::with_seed(4, 256, 1).unwrap();
    // 4 rows x 257 prime columns x 4 bytes dominates
    assert!(cm.byte_size() >= 4 * 257 * 4);
}
