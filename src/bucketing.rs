//! Directional bucketing classifier.
//!
//! Cuts the number of pairwise tests between two connector sets (or within
//! one set) without changing the result: every pair that [`test_pair`] could
//! accept is still tested, in the same argument order a brute-force sweep
//! would use.
//!
//! Connectors are split by family. Cylinders and clips are bucketed by axis
//! and gender (clips count as female, they only receive male cylinders),
//! fingers are bucketed by axis, generic connectors are tested brute force.
//! The bucket list is seeded with the X, Y and Z axes. In those three buckets,
//! once `male * female` reaches [`MatchConfig::advanced_bucket_threshold`],
//! connectors lying exactly on the bucket axis are indexed by a quantized
//! grid of their two off-axis start coordinates, and only neighbouring grid
//! cells are tested against each other.

use crate::config::MatchConfig;
use crate::connector::{ConnectorKind, Gender};
use crate::geometry::{exact_axis, is_almost_parallel, off_axis_coordinates};
use crate::pair_check::{PairMatch, PlacedConnector, test_pair};
use glam::Vec3;
use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;
use tracing::debug;

/// A successful pairwise test, by position in the input slices.
#[derive(Clone, Debug, PartialEq)]
pub struct PairHit {
    pub index_a: usize,
    pub index_b: usize,
    pub matched: PairMatch,
}

/// Axis buckets, pre-seeded with the coordinate axes.
struct DirectionSet {
    axes: Vec<Vec3>,
}

impl DirectionSet {
    fn seeded() -> Self {
        Self {
            axes: vec![Vec3::X, Vec3::Y, Vec3::Z],
        }
    }

    /// Bucket for `direction`, opening a new one if no axis is parallel to it.
    fn index_of(&mut self, direction: Vec3, tolerance: f32) -> usize {
        match self
            .axes
            .iter()
            .position(|axis| is_almost_parallel(*axis, direction, tolerance))
        {
            Some(i) => i,
            None => {
                self.axes.push(direction);
                self.axes.len() - 1
            }
        }
    }

    /// Bucket pairs `(i, j)`, `i < j`, whose axes are close enough that a
    /// member of one can still be parallel to a member of the other.
    fn near_pairs(&self, tolerance: f32) -> Vec<(usize, usize)> {
        let theta = tolerance.max(0.0).sqrt().min(1.0).asin();
        let limit = (3.0 * theta).min(FRAC_PI_2).sin() * 1.01 + 1e-6;
        let mut pairs = Vec::new();
        for i in 0..self.axes.len() {
            for j in i + 1..self.axes.len() {
                if self.axes[i].cross(self.axes[j]).length() < limit {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

/// One side's connector indices, grouped by family and axis bucket.
#[derive(Default)]
struct Buckets {
    male: Vec<Vec<usize>>,
    female: Vec<Vec<usize>>,
    fingers: Vec<Vec<usize>>,
    generic: Vec<usize>,
}

impl Buckets {
    fn classify(
        conns: &[PlacedConnector<'_>],
        directions: &mut DirectionSet,
        tolerance: f32,
    ) -> Self {
        let mut buckets = Buckets::default();
        for (index, conn) in conns.iter().enumerate() {
            if conn.is_degenerate() {
                continue;
            }
            let list = match &conn.connector.kind {
                ConnectorKind::Cylindrical(c) if c.gender == Gender::Male => &mut buckets.male,
                ConnectorKind::Cylindrical(_) | ConnectorKind::Clip(_) => &mut buckets.female,
                ConnectorKind::Finger(_) => &mut buckets.fingers,
                ConnectorKind::Generic(_) => {
                    buckets.generic.push(index);
                    continue;
                }
            };
            let bucket = directions.index_of(conn.direction, tolerance);
            if list.len() <= bucket {
                list.resize(bucket + 1, Vec::new());
            }
            list[bucket].push(index);
        }
        buckets
    }
}

fn bucket(lists: &[Vec<usize>], i: usize) -> &[usize] {
    lists.get(i).map_or(&[], Vec::as_slice)
}

type CellKey = (i64, i64);

/// Cell coordinates beyond this magnitude are not indexed.
const MAX_CELL_COORDINATE: f32 = 1.0e15;

/// Grid cell of a connector lying exactly on `axis`. `None` if it is off the
/// axis or too far out to quantize.
fn cell_of(conn: &PlacedConnector<'_>, axis: usize, cell: f32) -> Option<CellKey> {
    if exact_axis(conn.direction) != Some(axis) {
        return None;
    }
    let (u, v) = off_axis_coordinates(conn.start, axis);
    let quantize = |x: f32| {
        let q = (x / cell).floor();
        (q.abs() < MAX_CELL_COORDINATE).then_some(q as i64)
    };
    Some((quantize(u)?, quantize(v)?))
}

fn neighbours(key: CellKey) -> impl Iterator<Item = CellKey> {
    (-1..=1i64).flat_map(move |du| {
        (-1..=1i64).filter_map(move |dv| Some((key.0.checked_add(du)?, key.1.checked_add(dv)?)))
    })
}

/// Members of `list` that have a grid cell, by cell, plus the rest.
fn index_by_cell(
    list: &[usize],
    conns: &[PlacedConnector<'_>],
    axis: usize,
    cell: f32,
) -> (HashMap<CellKey, Vec<usize>>, Vec<usize>) {
    let mut grid: HashMap<CellKey, Vec<usize>> = HashMap::new();
    let mut loose = Vec::new();
    for &i in list {
        match cell_of(&conns[i], axis, cell) {
            Some(key) => grid.entry(key).or_default().push(i),
            None => loose.push(i),
        }
    }
    (grid, loose)
}

/// One classification sweep, accumulating hits from [`test_pair`].
///
/// With `within` set, `a` and `b` are the same slice and every pair is
/// tested as `(larger index, smaller index)`.
struct Sweep<'s, 'c> {
    a: &'s [PlacedConnector<'c>],
    b: &'s [PlacedConnector<'c>],
    config: &'s MatchConfig,
    within: bool,
    hits: Vec<PairHit>,
    tests: usize,
    indexed_buckets: usize,
}

impl<'s, 'c> Sweep<'s, 'c> {
    fn new(
        a: &'s [PlacedConnector<'c>],
        b: &'s [PlacedConnector<'c>],
        config: &'s MatchConfig,
        within: bool,
    ) -> Self {
        Self {
            a,
            b,
            config,
            within,
            hits: Vec::new(),
            tests: 0,
            indexed_buckets: 0,
        }
    }

    fn test(&mut self, ia: usize, ib: usize) {
        let (ia, ib) = if self.within && ia < ib { (ib, ia) } else { (ia, ib) };
        self.tests += 1;
        if let Some(matched) = test_pair(&self.a[ia], &self.b[ib], self.config) {
            self.hits.push(PairHit {
                index_a: ia,
                index_b: ib,
                matched,
            });
        }
    }

    /// The coordinate axis to index `bucket` on, if any. Needs a usable cell size.
    fn indexed_axis(&self, bucket: usize) -> Option<usize> {
        let cell = self.config.index_cell_size();
        let usable = cell.is_finite() && cell > 0.0;
        (usable && bucket < self.config.indexed_direction_buckets.min(3)).then_some(bucket)
    }

    /// Tests every pair of `left` (indices into `a`) and `right` (indices
    /// into `b`) that can match.
    fn lists(&mut self, left: &[usize], right: &[usize], axis: Option<usize>) {
        if left.is_empty() || right.is_empty() {
            return;
        }
        let threshold = self.config.advanced_bucket_threshold;
        let Some(axis) = axis.filter(|_| left.len() * right.len() >= threshold) else {
            for &l in left {
                for &r in right {
                    self.test(l, r);
                }
            }
            return;
        };
        self.indexed_buckets += 1;
        let cell = self.config.index_cell_size();
        // Index the smaller list, sweep the larger one.
        let index_left = left.len() < right.len();
        let (small, small_conns, large, large_conns) = if index_left {
            (left, self.a, right, self.b)
        } else {
            (right, self.b, left, self.a)
        };
        let (grid, loose) = index_by_cell(small, small_conns, axis, cell);
        for &g in large {
            let candidates: Vec<usize> = match cell_of(&large_conns[g], axis, cell) {
                Some(key) => neighbours(key)
                    .filter_map(|key| grid.get(&key))
                    .flatten()
                    .chain(&loose)
                    .copied()
                    .collect(),
                None => small.to_vec(),
            };
            for s in candidates {
                if index_left {
                    self.test(s, g);
                } else {
                    self.test(g, s);
                }
            }
        }
    }

    /// Tests every unordered pair within `list` that can match, once.
    fn list_within(&mut self, list: &[usize], axis: Option<usize>) {
        let threshold = self.config.advanced_bucket_threshold;
        let Some(axis) = axis.filter(|_| list.len() * list.len() >= threshold) else {
            for (n, &i) in list.iter().enumerate() {
                for &j in &list[..n] {
                    self.test(i, j);
                }
            }
            return;
        };
        self.indexed_buckets += 1;
        let (grid, loose) = index_by_cell(list, self.a, axis, self.config.index_cell_size());
        for (&key, members) in &grid {
            for &i in members {
                for other in neighbours(key).filter_map(|k| grid.get(&k)) {
                    for &j in other.iter().filter(|&&j| j < i) {
                        self.test(i, j);
                    }
                }
            }
        }
        for (n, &i) in loose.iter().enumerate() {
            for &j in loose[..n].iter().chain(grid.values().flatten()) {
                self.test(i, j);
            }
        }
    }
}

/// Connections between the connectors of two different parts.
///
/// Equivalent to [`find_pairs_between_brute_force`]; only the order of the
/// returned hits may differ.
pub fn find_pairs_between(
    a: &[PlacedConnector<'_>],
    b: &[PlacedConnector<'_>],
    config: &MatchConfig,
) -> Vec<PairHit> {
    let mut directions = DirectionSet::seeded();
    let tol = config.parallelity_tolerance;
    let ga = Buckets::classify(a, &mut directions, tol);
    let gb = Buckets::classify(b, &mut directions, tol);
    let near = directions.near_pairs(tol);

    let mut sweep = Sweep::new(a, b, config, false);
    for i in 0..directions.axes.len() {
        let axis = sweep.indexed_axis(i);
        sweep.lists(bucket(&ga.male, i), bucket(&gb.female, i), axis);
        sweep.lists(bucket(&ga.female, i), bucket(&gb.male, i), axis);
        sweep.lists(bucket(&ga.fingers, i), bucket(&gb.fingers, i), axis);
    }
    for &(i, j) in &near {
        for (x, y) in [(i, j), (j, i)] {
            sweep.lists(bucket(&ga.male, x), bucket(&gb.female, y), None);
            sweep.lists(bucket(&ga.female, x), bucket(&gb.male, y), None);
            sweep.lists(bucket(&ga.fingers, x), bucket(&gb.fingers, y), None);
        }
    }
    sweep.lists(&ga.generic, &gb.generic, None);

    debug!(
        buckets = directions.axes.len(),
        near_bucket_pairs = near.len(),
        indexed_buckets = sweep.indexed_buckets,
        tests = sweep.tests,
        naive_tests = a.len() * b.len(),
        hits = sweep.hits.len(),
        "bucketed connector check"
    );
    sweep.hits
}

/// Connections among the connectors of a single part, each unordered pair
/// reported once as `(i, j)` with `i > j`.
pub fn find_pairs_within(conns: &[PlacedConnector<'_>], config: &MatchConfig) -> Vec<PairHit> {
    let mut directions = DirectionSet::seeded();
    let tol = config.parallelity_tolerance;
    let g = Buckets::classify(conns, &mut directions, tol);
    let near = directions.near_pairs(tol);

    let mut sweep = Sweep::new(conns, conns, config, true);
    for i in 0..directions.axes.len() {
        let axis = sweep.indexed_axis(i);
        sweep.lists(bucket(&g.male, i), bucket(&g.female, i), axis);
        sweep.list_within(bucket(&g.fingers, i), axis);
    }
    for &(i, j) in &near {
        sweep.lists(bucket(&g.male, i), bucket(&g.female, j), None);
        sweep.lists(bucket(&g.male, j), bucket(&g.female, i), None);
        sweep.lists(bucket(&g.fingers, i), bucket(&g.fingers, j), None);
    }
    sweep.list_within(&g.generic, None);

    debug!(
        buckets = directions.axes.len(),
        indexed_buckets = sweep.indexed_buckets,
        tests = sweep.tests,
        hits = sweep.hits.len(),
        "bucketed single-part connector check"
    );
    sweep.hits
}

/// Reference: tests every `a x b` pair.
pub fn find_pairs_between_brute_force(
    a: &[PlacedConnector<'_>],
    b: &[PlacedConnector<'_>],
    config: &MatchConfig,
) -> Vec<PairHit> {
    let mut hits = Vec::new();
    for (ia, ca) in a.iter().enumerate() {
        for (ib, cb) in b.iter().enumerate() {
            if let Some(matched) = test_pair(ca, cb, config) {
                hits.push(PairHit {
                    index_a: ia,
                    index_b: ib,
                    matched,
                });
            }
        }
    }
    hits
}

/// Reference: tests every unordered pair `(i, j)`, `i > j`, of one set.
pub fn find_pairs_within_brute_force(
    conns: &[PlacedConnector<'_>],
    config: &MatchConfig,
) -> Vec<PairHit> {
    let mut hits = Vec::new();
    for i in 0..conns.len() {
        for j in 0..i {
            if let Some(matched) = test_pair(&conns[i], &conns[j], config) {
                hits.push(PairHit {
                    index_a: i,
                    index_b: j,
                    matched,
                });
            }
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{
        Bounding, ClipConnector, Connector, CylindricalConnector, CylindricalShapePart,
        FingerConnector, GenericConnector,
    };

    fn peg(gender: Gender, start: Vec3, direction: Vec3) -> Connector {
        Connector::new(
            "",
            start,
            direction,
            CylindricalConnector::new(gender, vec![CylindricalShapePart::round(2.0, 2.0)]),
        )
    }

    fn sorted(mut hits: Vec<PairHit>) -> Vec<PairHit> {
        hits.sort_by_key(|h| (h.index_a, h.index_b));
        hits
    }

    /// A studded plate: a grid of pegs pointing up, plus a few odd connectors.
    fn plate(gender: Gender, size: usize, shift: Vec3) -> Vec<Connector> {
        let mut conns = Vec::new();
        for x in 0..size {
            for y in 0..size {
                let start = Vec3::new(x as f32 * 8.0, y as f32 * 8.0, 0.0) + shift;
                conns.push(peg(gender, start, Vec3::Z));
            }
        }
        conns.push(peg(gender, shift, Vec3::new(0.01, 0.0, 1.0).normalize()));
        conns.push(peg(gender, shift + Vec3::X * 8.0, -Vec3::Z));
        conns.push(peg(gender, shift, Vec3::new(1.0, 1.0, 0.0).normalize()));
        conns.push(Connector::new("", shift, Vec3::Z, ClipConnector::new(2.0, 1.0)));
        conns.push(Connector::new(
            "pin",
            shift,
            Vec3::Y,
            GenericConnector::new(gender, Bounding::Point),
        ));
        conns
    }

    #[test]
    fn indexed_buckets_match_brute_force_between_parts() {
        let config = MatchConfig::default();
        let top = plate(Gender::Female, 6, Vec3::ZERO);
        let bottom = plate(Gender::Male, 6, Vec3::new(0.0, 0.0, -1.0));
        let a: Vec<_> = top.iter().map(PlacedConnector::local).collect();
        let b: Vec<_> = bottom.iter().map(PlacedConnector::local).collect();

        let fast = sorted(find_pairs_between(&a, &b, &config));
        let slow = sorted(find_pairs_between_brute_force(&a, &b, &config));
        assert!(slow.len() >= 36, "every stud finds its hole, got {}", slow.len());
        assert_eq!(fast, slow);
    }

    #[test]
    fn indexing_disabled_gives_same_result() {
        let config = MatchConfig {
            advanced_bucket_threshold: usize::MAX,
            ..MatchConfig::default()
        };
        let top = plate(Gender::Female, 4, Vec3::ZERO);
        let bottom = plate(Gender::Male, 4, Vec3::new(0.05, 0.0, -1.0));
        let a: Vec<_> = top.iter().map(PlacedConnector::local).collect();
        let b: Vec<_> = bottom.iter().map(PlacedConnector::local).collect();
        assert_eq!(
            sorted(find_pairs_between(&a, &b, &config)),
            sorted(find_pairs_between_brute_force(&a, &b, &config))
        );
    }

    #[test]
    fn nearby_buckets_are_cross_checked() {
        // 0.02 rad off Z joins the Z bucket, 0.04 rad opens a new one, yet the
        // two are parallel to each other.
        let tilt = |angle: f32| Vec3::new(angle.sin(), 0.0, angle.cos());
        let male = [peg(Gender::Male, Vec3::ZERO, tilt(0.02))];
        let female = [peg(Gender::Female, Vec3::ZERO, tilt(0.04))];
        let a: Vec<_> = male.iter().map(PlacedConnector::local).collect();
        let b: Vec<_> = female.iter().map(PlacedConnector::local).collect();
        let config = MatchConfig::default();

        let hits = find_pairs_between(&a, &b, &config);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits, find_pairs_between_brute_force(&a, &b, &config));
    }

    #[test]
    fn single_part_check_matches_brute_force() {
        let config = MatchConfig::default();
        let mut conns = plate(Gender::Male, 3, Vec3::ZERO);
        conns.extend(plate(Gender::Female, 3, Vec3::new(0.0, 0.0, 1.0)));
        for i in 0..6 {
            let first = if i % 2 == 0 { Gender::Male } else { Gender::Female };
            conns.push(Connector::new(
                "hinge",
                Vec3::new(0.0, 0.0, 2.0 * i as f32),
                Vec3::Z,
                FingerConnector::new(first, 4.0, vec![2.0, 2.0]),
            ));
        }
        let placed: Vec<_> = conns.iter().map(PlacedConnector::local).collect();

        let fast = sorted(find_pairs_within(&placed, &config));
        let slow = sorted(find_pairs_within_brute_force(&placed, &config));
        assert!(!slow.is_empty());
        assert!(fast.iter().all(|h| h.index_a > h.index_b));
        assert_eq!(fast, slow);
    }

    #[test]
    fn degenerate_connectors_are_skipped() {
        let broken = [peg(Gender::Male, Vec3::ZERO, Vec3::ZERO)];
        let hole = [peg(Gender::Female, Vec3::ZERO, Vec3::Z)];
        let a: Vec<_> = broken.iter().map(PlacedConnector::local).collect();
        let b: Vec<_> = hole.iter().map(PlacedConnector::local).collect();
        assert!(find_pairs_between(&a, &b, &MatchConfig::default()).is_empty());
    }

    #[test]
    fn far_and_unquantizable_starts_fall_back_to_brute_force() {
        let row = |gender: Gender, x: f32| -> Vec<Connector> {
            (0..4)
                .map(|i| peg(gender, Vec3::new(x, i as f32 * 8.0, -(i as f32)), Vec3::Z))
                .collect()
        };
        let males = row(Gender::Male, 1.0e19);
        let females = row(Gender::Female, 1.0e19);
        let a: Vec<_> = males.iter().map(PlacedConnector::local).collect();
        let b: Vec<_> = females.iter().map(PlacedConnector::local).collect();

        let exact = MatchConfig {
            colinearity_tolerance: 0.0,
            position_tolerance: 0.0,
            ..MatchConfig::default()
        };
        for config in [MatchConfig::default(), exact] {
            assert_eq!(
                sorted(find_pairs_between(&a, &b, &config)),
                sorted(find_pairs_between_brute_force(&a, &b, &config))
            );
            let mut both = a.clone();
            both.extend(b.iter().copied());
            assert_eq!(
                sorted(find_pairs_within(&both, &config)),
                sorted(find_pairs_within_brute_force(&both, &config))
            );
        }
    }

    #[test]
    fn neighbour_scan_stops_at_the_edge() {
        assert_eq!(neighbours((i64::MAX, 0)).count(), 6);
        assert_eq!(neighbours((0, 0)).count(), 9);
    }

    #[test]
    fn direction_set_merges_opposite_axes() {
        let mut set = DirectionSet::seeded();
        assert_eq!(set.index_of(-Vec3::Y, 0.001), 1);
        let diagonal = Vec3::new(1.0, 1.0, 0.0).normalize();
        assert_eq!(set.index_of(diagonal, 0.001), 3);
        assert_eq!(set.index_of(-diagonal, 0.001), 3);
        assert!(set.near_pairs(0.001).is_empty());
    }
}
