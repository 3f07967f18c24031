//! Integration tests for the composite sketches

use flowsketch::composite::{ElasticSketch, NitroSketch, TwoLevel, TwoLevelConfig};
use flowsketch::{AwareHash, FlowKey, Sketch};

fn key(v: u32) -> FlowKey<4> {
    FlowKey::from(v)
}

// ============================================================================
// Elastic sketch
// ============================================================================

#[test]
fn test_elastic_heavy_flow_preserved_exactly() {
    // flow A a thousand times among a hundred singletons: A stays heavy and
    // exact, the singletons stay small
    let mut es = ElasticSketch::<u64, u16, AwareHash, 4>::with_seed(64, 5, 3, 1024, 1).unwrap();
    let a = key(0xAAAA);
    for _ in 0..1000 {
        es.update(&a, 1);
    }
    for v in 1..=100u32 {
        es.update(&key(v), 1);
    }
    assert_eq!(es.query(&a), 1000);
    for v in 1..=100u32 {
        assert!(es.query(&key(v)) <= 2, "singleton {} inflated", v);
    }
}

#[test]
fn test_elastic_mass_is_conserved_down_to_light() {
    let mut es = ElasticSketch::<u64, u16, AwareHash, 4>::with_seed(4, 3, 3, 512, 2).unwrap();
    // more flows than heavy slots: spills must still be queryable
    for v in 0..200u32 {
        for _ in 0..3 {
            es.update(&key(v), 1);
        }
    }
    let visible = (0..200u32).filter(|&v| es.query(&key(v)) > 0).count();
    assert!(visible >= 190, "only {} of 200 flows visible", visible);
}

// ============================================================================
// NitroSketch
// ============================================================================

#[test]
fn test_nitro_correct_mode_equals_truth_for_lone_flow() {
    let mut ns = NitroSketch::<i64, AwareHash>::with_seed(5, 256, 3).unwrap();
    for _ in 0..300 {
        ns.update(&key(5), 1);
    }
    assert_eq!(ns.query(&key(5)), 300);
}

#[test]
fn test_nitro_sampled_estimate_is_near_truth() {
    let mut ns = NitroSketch::<i64, AwareHash>::with_seed(5, 512, 4).unwrap();
    ns.adjust_update_prob(8.0); // p = 1/8
    for _ in 0..16_000 {
        ns.always_line_rate_update(&key(9), 1);
    }
    let est = ns.query(&key(9));
    let rel_err = (est - 16_000).abs() as f64 / 16_000.0;
    assert!(rel_err < 0.25, "estimate {} too far from 16000", est);
}

#[test]
fn test_nitro_switches_mode_under_load() {
    let mut ns = NitroSketch::<i64, AwareHash>::with_seed(3, 8, 5).unwrap();
    ns.adjust_update_prob(32.0);
    assert!(!ns.line_rate_enabled());
    for v in 0..50_000u32 {
        ns.update(&key(v % 101), 7);
    }
    assert!(ns.line_rate_enabled(), "variance threshold never tripped");
}

// ============================================================================
// Two-level super-spreader detector
// ============================================================================

fn detector_config() -> TwoLevelConfig {
    TwoLevelConfig {
        distinct_bits: 1 << 17,
        distinct_hashes: 3,
        level1_bits: 1 << 13,
        level1_hashes: 3,
        table_count: 16,
        table_bits: 1 << 11,
        table_hashes: 2,
        reservoir_width: 128,
        r1: 1.0,
        r2: 1.0,
        gamma: 16.0,
        promote_threshold: 12,
    }
}

#[test]
fn test_two_level_separates_spreaders_from_point_sources() {
    let mut tl = TwoLevel::<AwareHash>::with_seed(&detector_config(), 1).unwrap();
    // one source scanning a /22, many sources with a couple of peers
    for dst in 1..=1000u32 {
        tl.insert(0xbeef, dst);
    }
    for src in 1..=200u32 {
        tl.insert(src, 1);
        tl.insert(src, 2);
        tl.insert(src, 3);
    }
    let spreaders = tl.super_spreaders();
    assert!(spreaders.contains(&0xbeef), "scanner not detected");
    for src in 1..=200u32 {
        assert!(!spreaders.contains(&src), "source {} misflagged", src);
    }
}

#[test]
fn test_two_level_clear_then_reuse() {
    let mut tl = TwoLevel::<AwareHash>::with_seed(&detector_config(), 2).unwrap();
    for dst in 1..=1000u32 {
        tl.insert(7, dst);
    }
    assert!(tl.super_spreaders().contains(&7));
    tl.clear();
    assert!(tl.super_spreaders().is_empty());
    for dst in 1..=1000u32 {
        tl.insert(9, dst);
    }
    assert!(tl.super_spreaders().contains(&9));
    assert!(tl.byte_size() > (1 << 17) / 8);
}
