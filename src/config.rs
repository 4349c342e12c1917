//! Matching tolerances and engine policies.

use serde::{Deserialize, Serialize};

/// Squared cross-product magnitude below which two unit directions are parallel.
pub const PARALLELITY_ANGLE_TOLERANCE: f32 = 0.001;
/// Maximum perpendicular distance (LDU) between two axes still considered colinear.
pub const COLINEARITY_TOLERANCE_LDU: f32 = 0.1;
/// Maximum positional mismatch (LDU) for point-like connectors and segment alignment.
pub const POSITION_TOLERANCE_LDU: f32 = 0.1;
/// Maximum radius mismatch (LDU) still considered contact.
pub const CONNECTION_RADIUS_TOLERANCE: f32 = 1.0;

/// How two generic connectors' bounding volumes take part in matching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundingPolicy {
    /// Only group, gender and position decide. Bounding volumes are ignored.
    #[default]
    Ignore,
    /// Both connectors must additionally declare the same bounding shape and size.
    RequireEqual,
}

/// Configuration for connection matching.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Squared cross-product magnitude of two directions still treated as parallel.
    pub parallelity_tolerance: f32,
    /// Max distance (LDU) between two connector axes to count as the same line.
    pub colinearity_tolerance: f32,
    /// Max positional mismatch (LDU) for points, clip offsets and finger boundaries.
    pub position_tolerance: f32,
    /// Max radius mismatch (LDU) still considered touching.
    pub radius_tolerance: f32,
    /// Minimum `male * female` count in a direction bucket before the indexed path is used.
    pub advanced_bucket_threshold: usize,
    /// Number of leading direction buckets (the seeded X, Y, Z axes) eligible for indexing.
    pub indexed_direction_buckets: usize,
    /// Bounding volume policy for generic connectors.
    pub generic_bounding_policy: BoundingPolicy,
    /// Evaluate scene-level candidate pairs on the rayon thread pool.
    pub parallel: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            parallelity_tolerance: PARALLELITY_ANGLE_TOLERANCE,
            colinearity_tolerance: COLINEARITY_TOLERANCE_LDU,
            position_tolerance: POSITION_TOLERANCE_LDU,
            radius_tolerance: CONNECTION_RADIUS_TOLERANCE,
            advanced_bucket_threshold: 16,
            indexed_direction_buckets: 3,
            generic_bounding_policy: BoundingPolicy::Ignore,
            parallel: false,
        }
    }
}

impl MatchConfig {
    /// Returns a copy with scene-level parallelism switched on or off (builder pattern).
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Returns a copy using the given generic bounding policy (builder pattern).
    pub fn with_bounding_policy(mut self, policy: BoundingPolicy) -> Self {
        self.generic_bounding_policy = policy;
        self
    }

    /// Edge length of the off-axis grid used by the indexed bucketing path.
    ///
    /// Twice the largest lateral tolerance, so any two starts close enough to
    /// match land in the same or an adjacent cell.
    pub(crate) fn index_cell_size(&self) -> f32 {
        2.0 * self.colinearity_tolerance.max(self.position_tolerance)
    }
}
