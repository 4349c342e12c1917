//! Pairwise connector tester.
//!
//! Decides whether exactly two connectors, placed in a common frame, join and
//! which motions the joint leaves. Every failed tolerance check is simply
//! "no connection"; nothing here can fail.

use crate::config::{BoundingPolicy, MatchConfig};
use crate::connector::{
    ClipConnector, Connector, ConnectorKind, CylindricalConnector, CylindricalShapePart,
    CylindricalShapeType, FingerConnector, Gender, GenericConnector,
};
use crate::dof::{DegreesOfFreedom, RotationPossibility};
use crate::geometry::{Alignment, AxisProjection, almost_greater, almost_less};
use glam::{Mat4, Vec3};
use tracing::trace;

/// A connector together with its start and axis in a shared frame.
///
/// Radii and lengths are read from the connector unscaled; only the anchor
/// and axis are moved.
#[derive(Clone, Copy, Debug)]
pub struct PlacedConnector<'a> {
    pub connector: &'a Connector,
    pub start: Vec3,
    /// Unit axis, or `Vec3::ZERO` if the transformed axis was degenerate.
    pub direction: Vec3,
}

impl<'a> PlacedConnector<'a> {
    /// Places `connector` with its owning part's absolute transform.
    pub fn new(connector: &'a Connector, transformation: &Mat4) -> Self {
        Self {
            connector,
            start: transformation.transform_point3(connector.start),
            direction: transformation
                .transform_vector3(connector.direction)
                .normalize_or_zero(),
        }
    }

    /// Uses the connector's own frame as the shared frame.
    pub fn local(connector: &'a Connector) -> Self {
        Self {
            connector,
            start: connector.start,
            direction: connector.direction.normalize_or_zero(),
        }
    }

    /// Geometry that can never take part in a connection: non-finite anchor,
    /// missing axis, empty or non-finite shape data, or extents whose sum
    /// overflows.
    pub fn is_degenerate(&self) -> bool {
        if !self.start.is_finite() {
            return true;
        }
        let valid_length = |v: f32| v.is_finite() && v >= 0.0;
        let directional = self.direction != Vec3::ZERO;
        match &self.connector.kind {
            ConnectorKind::Cylindrical(c) => {
                !directional
                    || c.parts.is_empty()
                    || !c.total_length().is_finite()
                    || c
                        .parts
                        .iter()
                        .any(|p| !valid_length(p.length) || !valid_length(p.radius))
            }
            ConnectorKind::Clip(c) => {
                !directional || !valid_length(c.width) || !valid_length(c.radius)
            }
            ConnectorKind::Finger(f) => {
                !directional
                    || f.finger_widths.is_empty()
                    || !f.total_width().is_finite()
                    || !valid_length(f.radius)
                    || f.finger_widths.iter().any(|w| !valid_length(*w))
            }
            ConnectorKind::Generic(_) => false,
        }
    }
}

/// Outcome of a successful pairwise test.
#[derive(Clone, Debug, PartialEq)]
pub struct PairMatch {
    pub degrees_of_freedom: DegreesOfFreedom,
    /// Whether connector A / B is engaged over its whole extent.
    pub completely_used: [bool; 2],
}

/// Tests two placed connectors. `None` if the kinds cannot join or any
/// geometric check fails.
pub fn test_pair(
    a: &PlacedConnector<'_>,
    b: &PlacedConnector<'_>,
    config: &MatchConfig,
) -> Option<PairMatch> {
    if a.is_degenerate() || b.is_degenerate() {
        trace!(a = %a.connector, b = %b.connector, "skipping degenerate connector pair");
        return None;
    }
    let alignment = Alignment::of(a.direction, b.direction, config.parallelity_tolerance);
    match (&a.connector.kind, &b.connector.kind) {
        (ConnectorKind::Cylindrical(ca), ConnectorKind::Cylindrical(cb)) => {
            cylinder_cylinder(a, ca, b, cb, alignment, config)
        }
        (ConnectorKind::Cylindrical(cyl), ConnectorKind::Clip(clip)) => {
            clip_cylinder(b, clip, a, cyl, alignment, config).map(|m| m.swapped())
        }
        (ConnectorKind::Clip(clip), ConnectorKind::Cylindrical(cyl)) => {
            clip_cylinder(a, clip, b, cyl, alignment, config)
        }
        (ConnectorKind::Finger(fa), ConnectorKind::Finger(fb)) => {
            finger_finger(a, fa, b, fb, alignment, config)
        }
        (ConnectorKind::Generic(ga), ConnectorKind::Generic(gb)) => {
            generic_generic(a, ga, b, gb, config)
        }
        _ => None,
    }
}

impl PairMatch {
    fn swapped(mut self) -> Self {
        self.completely_used.swap(0, 1);
        self
    }
}

/// Offset of B's start along A's axis, if the two axes are colinear and the
/// extents `[0, a_length]` and B's extent can overlap.
///
/// Colinearity is measured both ways, each start against the other axis, so
/// swapping A and B never changes the verdict for slightly tilted axes.
fn project_with_length(
    a: &PlacedConnector<'_>,
    b: &PlacedConnector<'_>,
    alignment: Alignment,
    a_length: f32,
    b_length: f32,
    config: &MatchConfig,
) -> Option<f32> {
    let projection = AxisProjection::new(a.start, a.direction, b.start);
    let back = AxisProjection::new(b.start, b.direction, a.start);
    let length = projection.length;
    let disjoint = match alignment {
        // Aaaaaaa   Bbbbbbbbb  or  Bbbbbb  Aaaaaa
        Alignment::Same => length > a_length || length < -b_length,
        // Aaaaaaa  bbbbbbbbB  or  bbbbbbB   Aaaaaaaa
        Alignment::Opposite => length > a_length + b_length || length < 0.0,
        Alignment::Skew => true,
    };
    let tol = config.colinearity_tolerance;
    if disjoint || !length.is_finite() || projection.distance >= tol || back.distance >= tol {
        None
    } else {
        Some(length)
    }
}

/// Cumulative part boundaries starting at `origin`.
fn boundaries<'p>(origin: f32, parts: impl Iterator<Item = &'p CylindricalShapePart>) -> Vec<f32> {
    let mut result = vec![origin];
    let mut offset = origin;
    for part in parts {
        offset += part.length;
        result.push(offset);
    }
    result
}

fn cylinder_cylinder(
    a: &PlacedConnector<'_>,
    ca: &CylindricalConnector,
    b: &PlacedConnector<'_>,
    cb: &CylindricalConnector,
    alignment: Alignment,
    config: &MatchConfig,
) -> Option<PairMatch> {
    if !alignment.is_parallel() || ca.gender == cb.gender {
        return None;
    }
    let b_total = cb.total_length();
    let start_offset = project_with_length(a, b, alignment, ca.total_length(), b_total, config)?;

    let a_parts: Vec<&CylindricalShapePart> = ca.parts.iter().collect();
    let (b_parts, b_origin): (Vec<&CylindricalShapePart>, f32) = match alignment {
        Alignment::Same => (cb.parts.iter().collect(), start_offset),
        _ => (cb.parts.iter().rev().collect(), start_offset - b_total),
    };
    let a_bounds = boundaries(0.0, a_parts.iter().copied());
    let b_bounds = boundaries(b_origin, b_parts.iter().copied());
    let a_len = a_parts.len() as isize;
    let b_len = b_parts.len() as isize;
    let at = |bounds: &[f32], i: isize| bounds[i as usize];

    let tol = config.position_tolerance;
    let male_is_a = ca.gender == Gender::Male;
    let mut a_cursor: isize = if almost_less(a_bounds[0], b_bounds[0], tol) { 0 } else { -1 };
    let mut b_cursor: isize = if almost_greater(a_bounds[0], b_bounds[0], tol) { 0 } else { -1 };
    let mut used_a = almost_greater(a_bounds[0], b_bounds[0], tol);
    let mut used_b = almost_greater(b_bounds[0], a_bounds[0], tol);

    let mut radial_collision = false;
    let mut rotation_possible = true;
    let mut contact = false;

    while a_cursor < a_len && b_cursor < b_len {
        if a_cursor >= 0 && b_cursor >= 0 {
            let pa = a_parts[a_cursor as usize];
            let pb = b_parts[b_cursor as usize];
            let (male_radius, female_radius) = if male_is_a {
                (pa.radius, pb.radius)
            } else {
                (pb.radius, pa.radius)
            };
            if male_radius - female_radius > config.radius_tolerance {
                radial_collision = true;
                break;
            }
            contact |= female_radius - male_radius < config.radius_tolerance;
            if pa.shape_type != CylindricalShapeType::Round && pa.shape_type == pb.shape_type {
                rotation_possible = false;
            }
            let a_exhausted = a_cursor >= a_len - 1
                && almost_less(at(&a_bounds, a_cursor + 1), at(&b_bounds, b_cursor), tol);
            let b_exhausted = b_cursor >= b_len - 1
                && almost_less(at(&b_bounds, b_cursor + 1), at(&a_bounds, a_cursor), tol);
            if a_exhausted || b_exhausted {
                break;
            }
        }
        // Advance whichever side ends first; both when they end together.
        let a_next = at(&a_bounds, a_cursor + 1);
        let b_next = at(&b_bounds, b_cursor + 1);
        let advance_a = almost_less(a_next, b_next, tol);
        let advance_b = almost_greater(a_next, b_next, tol);
        if !(advance_a || advance_b) {
            // Only reachable with a NaN boundary or a negative tolerance.
            return None;
        }
        if advance_a {
            a_cursor += 1;
        }
        if advance_b {
            b_cursor += 1;
        }
    }
    if radial_collision || !contact {
        return None;
    }
    used_a &= a_cursor >= a_len - 1;
    used_b &= b_cursor >= b_len - 1;

    let mut dof = DegreesOfFreedom::default();
    if ca.slide || cb.slide {
        dof.slide_directions.push(a.direction);
    }
    if rotation_possible {
        dof.rotation_possibilities
            .push(RotationPossibility::new(a.start, a.direction));
    }
    Some(PairMatch {
        degrees_of_freedom: dof,
        completely_used: [used_a, used_b],
    })
}

/// Returned flags are ordered `[clip, cylinder]`.
fn clip_cylinder(
    clip_data: &PlacedConnector<'_>,
    clip: &ClipConnector,
    cyl_data: &PlacedConnector<'_>,
    cyl: &CylindricalConnector,
    alignment: Alignment,
    config: &MatchConfig,
) -> Option<PairMatch> {
    if !alignment.is_parallel() || cyl.gender != Gender::Male {
        return None;
    }
    let projection = AxisProjection::new(cyl_data.start, cyl_data.direction, clip_data.start);
    if projection.distance > config.position_tolerance {
        return None;
    }
    let mut offset = projection.length;
    if alignment == Alignment::Opposite {
        offset -= clip.width;
    }

    let parts = &cyl.parts;
    let mut i = 0;
    while i < parts.len() && offset > parts[i].length {
        offset -= parts[i].length;
        i += 1;
    }
    let mut cyl_used = i == 0;

    let mut touching = false;
    while offset > -clip.width && i < parts.len() {
        let radius_diff = parts[i].radius - clip.radius;
        if radius_diff > config.radius_tolerance {
            return None;
        }
        touching |= radius_diff > -config.radius_tolerance;
        offset -= parts[i].length;
        i += 1;
    }
    if !touching {
        return None;
    }
    cyl_used &= i + 1 >= parts.len();
    let clip_used = offset < -clip.width;

    let mut dof = DegreesOfFreedom::default();
    dof.rotation_possibilities
        .push(RotationPossibility::new(cyl_data.start, cyl_data.direction));
    if cyl.slide && clip.slide {
        dof.slide_directions.push(cyl_data.direction);
    }
    Some(PairMatch {
        degrees_of_freedom: dof,
        completely_used: [clip_used, cyl_used],
    })
}

fn finger_finger(
    a: &PlacedConnector<'_>,
    fa: &FingerConnector,
    b: &PlacedConnector<'_>,
    fb: &FingerConnector,
    alignment: Alignment,
    config: &MatchConfig,
) -> Option<PairMatch> {
    if !alignment.is_parallel()
        || a.connector.group != b.connector.group
        || (fa.radius - fb.radius).abs() > config.radius_tolerance
    {
        return None;
    }
    let b_total = fb.total_width();
    let start_offset = project_with_length(a, b, alignment, fa.total_width(), b_total, config)?;

    let tol = config.position_tolerance;
    let a_count = fa.finger_widths.len() as isize;
    let b_count = fb.finger_widths.len() as isize;
    let same_dir = alignment == Alignment::Same;
    let b_step: isize = if same_dir { 1 } else { -1 };
    let b_in_range = |i: isize| (0..b_count).contains(&i);
    let mut a_idx: isize = 0;
    let mut b_idx: isize = if same_dir { 0 } else { b_count - 1 };
    let a_offset = if same_dir {
        start_offset
    } else {
        start_offset - b_total
    };

    let mut used_a = true;
    let mut used_b = true;
    if a_offset < -tol {
        // B starts first: skip B's fingers until both sides share a boundary.
        let mut offset = -a_offset;
        while offset > tol {
            if !b_in_range(b_idx) {
                return None;
            }
            offset -= fb.finger_widths[b_idx as usize];
            b_idx += b_step;
        }
        if offset < -tol {
            return None;
        }
        used_b = false;
    } else if a_offset > tol {
        let mut offset = a_offset;
        while offset > tol {
            if a_idx >= a_count {
                return None;
            }
            offset -= fa.finger_widths[a_idx as usize];
            a_idx += 1;
        }
        if offset < -tol {
            return None;
        }
        used_a = false;
    }
    if a_idx >= a_count || !b_in_range(b_idx) {
        return None;
    }
    if fa.finger_gender(a_idx as usize) == fb.finger_gender(b_idx as usize) {
        return None;
    }
    while a_idx < a_count && b_in_range(b_idx) {
        let wa = fa.finger_widths[a_idx as usize];
        let wb = fb.finger_widths[b_idx as usize];
        if (wa - wb).abs() > tol {
            return None;
        }
        a_idx += 1;
        b_idx += b_step;
    }
    if a_idx < a_count {
        used_a = false;
    }
    if b_in_range(b_idx) {
        used_b = false;
    }

    let mut dof = DegreesOfFreedom::default();
    dof.rotation_possibilities
        .push(RotationPossibility::new(a.start, a.direction));
    Some(PairMatch {
        degrees_of_freedom: dof,
        completely_used: [used_a, used_b],
    })
}

fn generic_generic(
    a: &PlacedConnector<'_>,
    ga: &GenericConnector,
    b: &PlacedConnector<'_>,
    gb: &GenericConnector,
    config: &MatchConfig,
) -> Option<PairMatch> {
    let bounding_ok = match config.generic_bounding_policy {
        BoundingPolicy::Ignore => true,
        BoundingPolicy::RequireEqual => ga.bounding == gb.bounding,
    };
    let close = a.start.distance_squared(b.start) <= config.position_tolerance.powi(2);
    if a.connector.group == b.connector.group && ga.gender != gb.gender && close && bounding_ok {
        Some(PairMatch {
            degrees_of_freedom: DegreesOfFreedom::rigid(),
            completely_used: [true, true],
        })
    } else {
        None
    }
}
