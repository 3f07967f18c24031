//! Integration tests for the heavy-hitter sketches

use flowsketch::heavy_hitters::{HashPipe, LossyCount, MisraGries, SpaceSaving};
use flowsketch::{AwareHash, FlowKey, Sketch};
use proptest::prelude::*;
use std::collections::HashMap;

fn key(v: u32) -> FlowKey<4> {
    FlowKey::from(v)
}

// ============================================================================
// Misra-Gries
// ============================================================================

#[test]
fn test_misra_gries_top_k_scenario() {
    // k=2, stream [A, A, A, B, C, D, A]
    let mut mg = MisraGries::<u64, 4>::new(2).unwrap();
    let stream = [0xA, 0xA, 0xA, 0xB, 0xC, 0xD, 0xA];
    for v in stream {
        mg.update(&key(v), 1);
    }
    let hitters = mg.heavy_hitters_lb(3);
    assert!(hitters.contains_key(&key(0xA)));

    assert!(mg.len() <= 2);
    let tracked: u64 = [0xA, 0xB, 0xC, 0xD].iter().map(|&v| mg.query(&key(v))).sum();
    assert!(tracked <= 7);
}

proptest! {
    #[test]
    fn prop_misra_gries_invariant(
        updates in prop::collection::vec((0u32..20, 1u64..8), 1..150)
    ) {
        let mut mg = MisraGries::<u64, 4>::new(4).unwrap();
        let mut total = 0i64;
        for (k, v) in &updates {
            mg.update(&key(*k), *v);
            total += *v as i64;
            // invariant holds at every step, not just at the end
            prop_assert!(mg.len() <= 4);
            let tracked: i64 = (0..20u32).map(|x| mg.query(&key(x)) as i64).sum();
            prop_assert!(tracked <= total);
        }
    }
}

// ============================================================================
// Space-Saving
// ============================================================================

proptest! {
    #[test]
    fn prop_space_saving_overestimates(
        updates in prop::collection::vec((0u32..30, 1u64..5), 1..150)
    ) {
        let mut ss = SpaceSaving::<u64, 4>::new(8).unwrap();
        let mut truth: HashMap<u32, u64> = HashMap::new();
        for (k, v) in &updates {
            ss.update(&key(*k), *v);
            *truth.entry(*k).or_insert(0) += v;
        }
        // every key still tracked reads at least its true count
        for (k, count) in truth {
            let est = ss.query(&key(k));
            if est > 0 {
                prop_assert!(est >= count);
            }
        }
    }
}

#[test]
fn test_space_saving_finds_majority_flow() {
    let mut ss = SpaceSaving::<u64, 4>::new(4).unwrap();
    for round in 0..100u32 {
        ss.update(&key(1), 5);
        ss.update(&key(100 + round), 1);
    }
    let hitters = ss.heavy_hitters(400);
    assert!(hitters.contains_key(&key(1)));
}

// ============================================================================
// HashPipe
// ============================================================================

#[test]
fn test_hash_pipe_tracks_elephants_among_mice() {
    let mut hp = HashPipe::<u64, AwareHash, 4>::with_seed(4, 128, 21).unwrap();
    for round in 0..500u32 {
        hp.update(&key(1), 4);
        hp.update(&key(2), 3);
        hp.update(&key(10_000 + round), 1);
    }
    assert!(hp.query(&key(1)) >= 1000);
    assert!(hp.query(&key(2)) >= 700);
    let hitters = hp.heavy_hitters(700);
    assert!(hitters.contains_key(&key(1)));
    assert!(hitters.contains_key(&key(2)));
}

// ============================================================================
// Lossy Counting
// ============================================================================

#[test]
fn test_lossy_count_error_bound() {
    // epsilon = 0.01 over a stream of 10_000: undercount at most 100
    let mut lc = LossyCount::<u64, AwareHash, 4>::with_seed(0.01, 256, 23).unwrap();
    for round in 0..1000u32 {
        for _ in 0..5 {
            lc.update(&key(7), 1);
        }
        for v in 0..5u32 {
            lc.update(&key(1000 + (round * 5 + v) % 4000), 1);
        }
    }
    let est = lc.query(&key(7));
    assert!(est >= 4900, "heavy flow undercounted: {}", est);
    assert!(est <= 5000);
}

#[test]
fn test_lossy_count_clear() {
    let mut lc = LossyCount::<u64, AwareHash, 4>::with_seed(0.1, 64, 1).unwrap();
    for v in 0..100u32 {
        lc.update(&key(v), 1);
    }
    lc.clear();
    assert_eq!(lc.epoch(), 1);
    assert_eq!(lc.query(&key(0)), 0);
    assert!(lc.byte_size() > 0);
}
