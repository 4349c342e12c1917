//! Residual motion of a confirmed joint.

use crate::config::{COLINEARITY_TOLERANCE_LDU, PARALLELITY_ANGLE_TOLERANCE};
use crate::geometry::{AxisProjection, is_almost_parallel};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A line about which a joint still permits free rotation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotationPossibility {
    /// A point on the rotation axis.
    pub origin: Vec3,
    /// Unit direction of the rotation axis.
    pub axis: Vec3,
}

impl RotationPossibility {
    pub fn new(origin: Vec3, axis: Vec3) -> Self {
        Self { origin, axis }
    }

    /// True if both describe the same line (parallel axes, colinear origins).
    pub fn compatible(&self, other: &RotationPossibility) -> bool {
        is_almost_parallel(self.axis, other.axis, PARALLELITY_ANGLE_TOLERANCE)
            && AxisProjection::new(self.origin, self.axis, other.origin).distance
                <= COLINEARITY_TOLERANCE_LDU
    }
}

/// Slide axes and rotation lines a joint still permits.
///
/// Both lists empty means the joint is rigid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DegreesOfFreedom {
    pub slide_directions: Vec<Vec3>,
    pub rotation_possibilities: Vec<RotationPossibility>,
}

impl DegreesOfFreedom {
    /// A fully rigid joint.
    pub fn rigid() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slide_directions.is_empty() && self.rotation_possibilities.is_empty()
    }

    pub fn can_slide(&self) -> bool {
        !self.slide_directions.is_empty()
    }

    pub fn can_rotate(&self) -> bool {
        !self.rotation_possibilities.is_empty()
    }

    /// Same motions up to axis sign, origin placement along the axis and ordering.
    pub fn equivalent(&self, other: &DegreesOfFreedom) -> bool {
        let slides = |a: &[Vec3], b: &[Vec3]| {
            a.iter().all(|d| {
                b.iter()
                    .any(|e| is_almost_parallel(*d, *e, PARALLELITY_ANGLE_TOLERANCE))
            })
        };
        let rotations = |a: &[RotationPossibility], b: &[RotationPossibility]| {
            a.iter().all(|r| b.iter().any(|s| r.compatible(s)))
        };
        slides(&self.slide_directions, &other.slide_directions)
            && slides(&other.slide_directions, &self.slide_directions)
            && rotations(&self.rotation_possibilities, &other.rotation_possibilities)
            && rotations(&other.rotation_possibilities, &self.rotation_possibilities)
    }

    /// Motions permitted by every joint in `dofs` at once.
    ///
    /// Two parts joined by several connector pairs can only move in ways all
    /// joints allow: a slide axis survives if every joint has a parallel one,
    /// a rotation line survives if every joint has a colinear one. An empty
    /// slice yields a rigid result.
    pub fn reduce(dofs: &[DegreesOfFreedom]) -> DegreesOfFreedom {
        let Some((first, rest)) = dofs.split_first() else {
            return DegreesOfFreedom::default();
        };
        let mut result = first.clone();
        for item in rest {
            result.slide_directions.retain(|dir| {
                item.slide_directions
                    .iter()
                    .any(|d| is_almost_parallel(*d, *dir, PARALLELITY_ANGLE_TOLERANCE))
            });
            result.rotation_possibilities.retain(|possibility| {
                item.rotation_possibilities
                    .iter()
                    .any(|p| possibility.compatible(p))
            });
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hinge(origin: Vec3, axis: Vec3) -> DegreesOfFreedom {
        DegreesOfFreedom {
            slide_directions: vec![],
            rotation_possibilities: vec![RotationPossibility::new(origin, axis)],
        }
    }

    #[test]
    fn rotation_lines_compare_as_lines() {
        let a = RotationPossibility::new(Vec3::ZERO, Vec3::Z);
        assert!(a.compatible(&RotationPossibility::new(Vec3::new(0.0, 0.0, 9.0), -Vec3::Z)));
        assert!(a.compatible(&RotationPossibility::new(Vec3::new(0.05, 0.0, 3.0), Vec3::Z)));
        assert!(!a.compatible(&RotationPossibility::new(Vec3::new(1.0, 0.0, 0.0), Vec3::Z)));
        assert!(!a.compatible(&RotationPossibility::new(Vec3::ZERO, Vec3::X)));
    }

    #[test]
    fn equivalence_ignores_sign_and_origin_along_axis() {
        let a = hinge(Vec3::ZERO, Vec3::Z);
        let b = hinge(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z);
        assert!(a.equivalent(&b));
        assert!(!a.equivalent(&DegreesOfFreedom::rigid()));
        assert!(DegreesOfFreedom::rigid().equivalent(&DegreesOfFreedom::rigid()));
    }

    #[test]
    fn reduce_intersects_motions() {
        let mut slider = hinge(Vec3::ZERO, Vec3::Z);
        slider.slide_directions.push(Vec3::Z);
        let same_axis = hinge(Vec3::new(0.0, 0.0, 4.0), Vec3::Z);
        let other_axis = hinge(Vec3::new(20.0, 0.0, 0.0), Vec3::Z);

        let both = DegreesOfFreedom::reduce(&[slider.clone(), same_axis]);
        assert!(both.can_rotate());
        assert!(!both.can_slide());

        let apart = DegreesOfFreedom::reduce(&[slider.clone(), other_axis]);
        assert!(apart.is_empty(), "two parallel hinges on different lines lock the joint");

        assert_eq!(DegreesOfFreedom::reduce(&[slider.clone()]), slider);
        assert!(DegreesOfFreedom::reduce(&[]).is_empty());
    }
}
