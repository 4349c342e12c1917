//! Property-based tests for connector matching.
//!
//! These tests use proptest to generate random connectors and verify the
//! matching invariants, including that bucketing never changes the result.
//!
//! Run with: cargo test --test proptest_connections

use glam::Vec3;
use proptest::prelude::*;
use snap_connect::{
    Bounding, ClipConnector, Connector, ConnectorKind, CylindricalConnector, CylindricalShapePart,
    CylindricalShapeType, FingerConnector, Gender, GenericConnector, MatchConfig, PairHit,
    PlacedConnector, find_pairs_between, find_pairs_between_brute_force, find_pairs_within,
    find_pairs_within_brute_force, test_pair,
};

// =============================================================================
// Strategies
// =============================================================================

fn arb_gender() -> impl Strategy<Value = Gender> {
    prop_oneof![Just(Gender::Male), Just(Gender::Female)]
}

/// Multiples of 0.5, exactly representable, so tolerances are never borderline.
fn arb_grid(steps: i32) -> impl Strategy<Value = f32> {
    (-steps..=steps).prop_map(|k| k as f32 * 0.5)
}

fn arb_grid_start() -> impl Strategy<Value = Vec3> {
    (arb_grid(1), arb_grid(1), arb_grid(8)).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

fn arb_shape_part() -> impl Strategy<Value = CylindricalShapePart> {
    (
        prop_oneof![
            Just(CylindricalShapeType::Round),
            Just(CylindricalShapeType::Axle)
        ],
        prop_oneof![Just(1.0f32), Just(2.0), Just(3.5)],
        (1..=4).prop_map(|k| k as f32 * 0.5),
    )
        .prop_map(|(shape_type, radius, length)| {
            CylindricalShapePart::new(shape_type, radius, length)
        })
}

fn arb_cylinder(gender: Gender) -> impl Strategy<Value = ConnectorKind> {
    (prop::collection::vec(arb_shape_part(), 1..=3), any::<bool>()).prop_map(
        move |(parts, slide)| {
            ConnectorKind::from(CylindricalConnector::new(gender, parts).with_slide(slide))
        },
    )
}

/// Any connector kind, with grid-friendly dimensions.
fn arb_kind() -> impl Strategy<Value = ConnectorKind> {
    prop_oneof![
        arb_gender().prop_flat_map(arb_cylinder),
        (
            prop_oneof![Just(1.0f32), Just(2.0), Just(3.5)],
            prop_oneof![Just(1.0f32), Just(2.0)],
            any::<bool>()
        )
            .prop_map(|(radius, width, slide)| {
                ConnectorKind::from(ClipConnector::new(radius, width).with_slide(slide))
            }),
        (arb_gender(), 1usize..=3).prop_map(|(first, n)| {
            ConnectorKind::from(FingerConnector::new(first, 2.0, vec![2.0; n]))
        }),
        arb_gender().prop_map(|g| ConnectorKind::from(GenericConnector::new(g, Bounding::Point))),
    ]
}

/// Coordinate axes plus Z tilted by 0.03 rad, which still counts as parallel
/// to Z (sin² ≈ 0.0009 < 0.001).
fn arb_axis_direction() -> impl Strategy<Value = Vec3> {
    prop_oneof![
        Just(Vec3::Z),
        Just(-Vec3::Z),
        Just(Vec3::X),
        Just(Vec3::new(0.03f32.sin(), 0.0, 0.03f32.cos())),
    ]
}

/// A connector on the grid, along a coordinate axis or slightly off Z.
fn arb_grid_connector() -> impl Strategy<Value = Connector> {
    (arb_grid_start(), arb_axis_direction(), arb_kind())
        .prop_map(|(start, direction, kind)| Connector::new("", start, direction, kind))
}

/// Directions that exercise every bucketing path: exact axes, near-axis tilts
/// that land in (or just outside) an axis bucket, a skew diagonal, and a
/// degenerate zero axis.
fn arb_mixed_direction() -> impl Strategy<Value = Vec3> {
    prop_oneof![
        4 => prop_oneof![
            Just(Vec3::X),
            Just(-Vec3::X),
            Just(Vec3::Y),
            Just(Vec3::Z),
            Just(-Vec3::Z)
        ],
        1 => prop_oneof![
            Just(Vec3::new(0.02, 0.0, 1.0).normalize()),
            Just(Vec3::new(0.04, 0.0, 1.0).normalize()),
            Just(Vec3::new(1.0, 1.0, 0.0).normalize()),
            Just(Vec3::ZERO),
        ],
    ]
}

/// Starts on a coarse grid with a little jitter, so tolerances are exercised too.
fn arb_jittered_start() -> impl Strategy<Value = Vec3> {
    (
        arb_grid(2),
        arb_grid(2),
        arb_grid(6),
        prop::array::uniform3(-0.15f32..0.15),
        any::<bool>(),
    )
        .prop_map(|(x, y, z, jitter, jittered)| {
            let base = Vec3::new(x, y, z);
            if jittered { base + Vec3::from(jitter) } else { base }
        })
}

fn arb_scene_connector() -> impl Strategy<Value = Connector> {
    (
        prop_oneof![Just(""), Just("x")],
        arb_jittered_start(),
        arb_mixed_direction(),
        arb_kind(),
    )
        .prop_map(|(group, start, direction, kind)| Connector::new(group, start, direction, kind))
}

fn arb_unit_vector() -> impl Strategy<Value = Vec3> {
    prop::array::uniform3(-1.0f32..1.0)
        .prop_map(Vec3::from)
        .prop_filter("non-degenerate", |v| v.length() > 0.1)
        .prop_map(Vec3::normalize)
}

// =============================================================================
// Helpers
// =============================================================================

fn check(a: &Connector, b: &Connector) -> Option<snap_connect::PairMatch> {
    test_pair(
        &PlacedConnector::local(a),
        &PlacedConnector::local(b),
        &MatchConfig::default(),
    )
}

fn sorted(mut hits: Vec<PairHit>) -> Vec<PairHit> {
    hits.sort_by_key(|h| (h.index_a, h.index_b));
    hits
}

fn is_directional(kind: &ConnectorKind) -> bool {
    !matches!(kind, ConnectorKind::Generic(_))
}

/// A config that sends every axis bucket down the indexed path.
fn always_indexed() -> MatchConfig {
    MatchConfig {
        advanced_bucket_threshold: 1,
        ..MatchConfig::default()
    }
}

// =============================================================================
// Matching invariants
// =============================================================================

proptest! {
    /// Two cylinders of the same gender never join.
    #[test]
    fn same_gender_cylinders_never_match(
        kinds in arb_gender().prop_flat_map(|g| (arb_cylinder(g), arb_cylinder(g))),
        start_a in arb_grid_start(),
        start_b in arb_grid_start(),
        dir_b in arb_axis_direction(),
    ) {
        let a = Connector::new("", start_a, Vec3::Z, kinds.0);
        let b = Connector::new("", start_b, dir_b, kinds.1);
        prop_assert!(check(&a, &b).is_none());
    }

    /// Clips only receive male cylinders, and never another clip.
    #[test]
    fn clips_never_take_female_cylinders(
        hole in arb_cylinder(Gender::Female),
        start in arb_grid_start(),
        radius in prop_oneof![Just(1.0f32), Just(2.0), Just(3.5)],
    ) {
        let clip = Connector::new("", Vec3::ZERO, Vec3::Z, ClipConnector::new(radius, 2.0));
        let hole = Connector::new("", start, Vec3::Z, hole);
        prop_assert!(check(&clip, &hole).is_none());
        prop_assert!(check(&hole, &clip).is_none());
        prop_assert!(check(&clip, &clip.clone()).is_none());
    }

    /// Generic connectors of the same gender never join, even when coincident.
    #[test]
    fn same_gender_generics_never_match(gender in arb_gender(), offset in arb_grid_start()) {
        let snap = || GenericConnector::new(gender, Bounding::Point);
        let a = Connector::new("x", Vec3::ZERO, Vec3::Y, snap());
        let b = Connector::new("x", offset * 0.1, Vec3::Y, snap());
        prop_assert!(check(&a, &b).is_none());
    }

    /// Axial connectors on skew axes never join.
    #[test]
    fn skew_axes_never_match(
        kind_a in arb_kind().prop_filter("axial", is_directional),
        kind_b in arb_kind().prop_filter("axial", is_directional),
        dir_a in arb_unit_vector(),
        dir_b in arb_unit_vector(),
        start_b in arb_grid_start(),
    ) {
        prop_assume!(dir_a.cross(dir_b).length_squared() >= 0.0011);
        let a = Connector::new("", Vec3::ZERO, dir_a, kind_a);
        let b = Connector::new("", start_b, dir_b, kind_b);
        prop_assert!(check(&a, &b).is_none());
    }

    /// Swapping the arguments never changes whether, or how, two connectors join.
    #[test]
    fn matching_is_symmetric(a in arb_grid_connector(), b in arb_grid_connector()) {
        let ab = check(&a, &b);
        let ba = check(&b, &a);
        prop_assert_eq!(ab.is_some(), ba.is_some());
        if let (Some(ab), Some(ba)) = (ab, ba) {
            prop_assert!(
                ab.degrees_of_freedom.equivalent(&ba.degrees_of_freedom),
                "{:?} vs {:?}",
                ab.degrees_of_freedom,
                ba.degrees_of_freedom
            );
        }
    }
}

// =============================================================================
// Bucketing equivalence
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The bucketed search finds exactly what testing every pair finds.
    #[test]
    fn bucketing_matches_brute_force_between_parts(
        a in prop::collection::vec(arb_scene_connector(), 0..40),
        b in prop::collection::vec(arb_scene_connector(), 0..40),
    ) {
        let pa: Vec<_> = a.iter().map(PlacedConnector::local).collect();
        let pb: Vec<_> = b.iter().map(PlacedConnector::local).collect();
        for config in [MatchConfig::default(), always_indexed()] {
            let expected = sorted(find_pairs_between_brute_force(&pa, &pb, &config));
            prop_assert_eq!(sorted(find_pairs_between(&pa, &pb, &config)), expected);
        }
    }

    /// Same for connections among the connectors of a single part.
    #[test]
    fn bucketing_matches_brute_force_within_part(
        conns in prop::collection::vec(arb_scene_connector(), 0..50),
    ) {
        let placed: Vec<_> = conns.iter().map(PlacedConnector::local).collect();
        for config in [MatchConfig::default(), always_indexed()] {
            let expected = sorted(find_pairs_within_brute_force(&placed, &config));
            prop_assert_eq!(sorted(find_pairs_within(&placed, &config)), expected);
        }
    }
}
