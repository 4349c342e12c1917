//! # snap-connect
//!
//! A connector matching and connection-graph engine for interlocking construction-toy parts.
//!
//! Every part definition declares [`Connector`]s: studs and holes (cylindrical stacks of shape
//! parts), clips, hinge fingers and generic snap points. Given placed part instances, the engine
//! decides which connector pairs physically join, computes the [`DegreesOfFreedom`] each joint
//! leaves, and accumulates the result in a [`ConnectionGraph`].
//!
//! The pairwise geometric test lives in [`pair_check`], the bucketing that avoids testing every
//! connector pair in [`bucketing`], and the scene walk with bounding-box pruning in [`scene`].

pub mod bucketing;
pub mod config;
pub mod connector;
pub mod dof;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod pair_check;
pub mod scene;

pub use bucketing::*;
pub use config::*;
pub use connector::*;
pub use dof::*;
pub use error::*;
pub use graph::*;
pub use pair_check::*;
pub use scene::*;
