//! Small geometric helpers shared by the tester, the bucketing and the scene walk.

use bevy_math::Vec3A;
use bevy_math::bounding::Aabb3d;
use glam::{Mat4, Vec3};

/// `a < b` allowing an overshoot of `epsilon`.
#[inline]
pub fn almost_less(a: f32, b: f32, epsilon: f32) -> bool {
    b - a + epsilon > 0.0
}

/// `a > b` allowing a shortfall of `epsilon`.
#[inline]
pub fn almost_greater(a: f32, b: f32, epsilon: f32) -> bool {
    a - b + epsilon > 0.0
}

/// Relative orientation of two connector axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alignment {
    /// Parallel, pointing the same way.
    Same,
    /// Parallel, pointing opposite ways.
    Opposite,
    /// Neither parallel nor anti-parallel within tolerance.
    Skew,
}

impl Alignment {
    /// Classifies two unit directions. `tolerance` bounds the squared cross product.
    pub fn of(a: Vec3, b: Vec3, tolerance: f32) -> Self {
        if !is_almost_parallel(a, b, tolerance) {
            Alignment::Skew
        } else if a.dot(b) > 0.0 {
            Alignment::Same
        } else {
            Alignment::Opposite
        }
    }

    /// True for [`Alignment::Same`] and [`Alignment::Opposite`].
    pub fn is_parallel(self) -> bool {
        self != Alignment::Skew
    }
}

/// Parallel or anti-parallel: the squared cross product of the unit directions is below `tolerance`.
#[inline]
pub fn is_almost_parallel(a: Vec3, b: Vec3, tolerance: f32) -> bool {
    a.cross(b).length_squared() < tolerance
}

/// Orthogonal projection of a point onto a line through `origin` along unit `axis`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisProjection {
    /// Signed distance from `origin` to the foot point, along `axis`.
    pub length: f32,
    /// Perpendicular distance from the point to the line.
    pub distance: f32,
}

impl AxisProjection {
    pub fn new(origin: Vec3, axis: Vec3, point: Vec3) -> Self {
        let diff = point - origin;
        Self {
            length: diff.dot(axis),
            distance: diff.cross(axis).length(),
        }
    }
}

/// Index of the coordinate axis `direction` lies on exactly (`±X`, `±Y`, `±Z`), if any.
pub fn exact_axis(direction: Vec3) -> Option<usize> {
    let a = direction.to_array();
    (0..3).find(|&i| a[i].abs() == 1.0 && a[(i + 1) % 3] == 0.0 && a[(i + 2) % 3] == 0.0)
}

/// The two coordinates of `point` orthogonal to coordinate axis `axis`.
#[inline]
pub fn off_axis_coordinates(point: Vec3, axis: usize) -> (f32, f32) {
    let p = point.to_array();
    (p[(axis + 1) % 3], p[(axis + 2) % 3])
}

/// Builds an AABB from its corner extremes.
pub fn aabb_from_min_max(min: Vec3, max: Vec3) -> Aabb3d {
    Aabb3d {
        min: Vec3A::from(min.min(max)),
        max: Vec3A::from(min.max(max)),
    }
}

/// World-space AABB enclosing `local` after applying `transform`.
pub fn transform_aabb(local: &Aabb3d, transform: &Mat4) -> Aabb3d {
    let min = Vec3::from(local.min);
    let max = Vec3::from(local.max);
    let mut out_min = Vec3::splat(f32::INFINITY);
    let mut out_max = Vec3::splat(f32::NEG_INFINITY);
    for corner in 0..8 {
        let p = Vec3::new(
            if corner & 1 == 0 { min.x } else { max.x },
            if corner & 2 == 0 { min.y } else { max.y },
            if corner & 4 == 0 { min.z } else { max.z },
        );
        let t = transform.transform_point3(p);
        out_min = out_min.min(t);
        out_max = out_max.max(t);
    }
    aabb_from_min_max(out_min, out_max)
}
