//! Connector data model.
//!
//! A [`Connector`] is an immutable geometric descriptor attached to a part
//! definition: an anchor point, a principal axis, a group tag and a
//! kind-specific payload ([`ConnectorKind`]). Connectors are produced by an
//! extraction collaborator and only ever read by the matching engine.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Polarity of a connector. Only opposite genders join.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn opposite(self) -> Self {
        match self {
            Gender::Male => Gender::Female,
            Gender::Female => Gender::Male,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gender::Male => "M",
            Gender::Female => "F",
        })
    }
}

/// Cross-section of one cylindrical shape part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CylindricalShapeType {
    /// Circular; never blocks rotation.
    Round,
    /// Cross-shaped axle profile.
    Axle,
    /// Square profile.
    Square,
}

/// One segment of a cylindrical connector's shape stack.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CylindricalShapePart {
    pub shape_type: CylindricalShapeType,
    pub flexible_radius: bool,
    pub radius: f32,
    pub length: f32,
}

impl CylindricalShapePart {
    pub fn new(shape_type: CylindricalShapeType, radius: f32, length: f32) -> Self {
        Self {
            shape_type,
            flexible_radius: false,
            radius,
            length,
        }
    }

    /// A round segment, the most common shape.
    pub fn round(radius: f32, length: f32) -> Self {
        Self::new(CylindricalShapeType::Round, radius, length)
    }

    /// Marks the radius as flexible (builder pattern).
    pub fn with_flexible_radius(mut self, flexible: bool) -> Self {
        self.flexible_radius = flexible;
        self
    }
}

/// Pegs, holes, axles and studs: a stack of shape parts along the axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CylindricalConnector {
    pub gender: Gender,
    /// Shape parts, stacked end-to-end from `start` along `direction`.
    pub parts: Vec<CylindricalShapePart>,
    /// Informational: whether the start end is open.
    pub open_start: bool,
    /// Informational: whether the far end is open.
    pub open_end: bool,
    /// This connector alone permits free axial translation.
    pub slide: bool,
}

impl CylindricalConnector {
    pub fn new(gender: Gender, parts: Vec<CylindricalShapePart>) -> Self {
        Self {
            gender,
            parts,
            open_start: true,
            open_end: true,
            slide: false,
        }
    }

    /// Sets the slide flag (builder pattern).
    pub fn with_slide(mut self, slide: bool) -> Self {
        self.slide = slide;
        self
    }

    /// Sets which ends are open (builder pattern).
    pub fn with_open_ends(mut self, open_start: bool, open_end: bool) -> Self {
        self.open_start = open_start;
        self.open_end = open_end;
        self
    }

    /// Sum of all part lengths.
    pub fn total_length(&self) -> f32 {
        self.parts.iter().map(|p| p.length).sum()
    }
}

/// A C-shaped bracket that wraps a male cylinder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipConnector {
    pub radius: f32,
    /// Axial engagement length.
    pub width: f32,
    pub slide: bool,
    /// Direction the clip's mouth faces. Informational.
    pub opening_direction: Vec3,
}

impl ClipConnector {
    pub fn new(radius: f32, width: f32) -> Self {
        Self {
            radius,
            width,
            slide: false,
            opening_direction: Vec3::ZERO,
        }
    }

    /// Sets the slide flag (builder pattern).
    pub fn with_slide(mut self, slide: bool) -> Self {
        self.slide = slide;
        self
    }
}

/// Hinge fingers: alternating male/female segments along the axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FingerConnector {
    pub first_finger_gender: Gender,
    pub radius: f32,
    pub finger_widths: Vec<f32>,
}

impl FingerConnector {
    pub fn new(first_finger_gender: Gender, radius: f32, finger_widths: Vec<f32>) -> Self {
        Self {
            first_finger_gender,
            radius,
            finger_widths,
        }
    }

    pub fn total_width(&self) -> f32 {
        self.finger_widths.iter().sum()
    }

    /// Gender of the finger at `index`, alternating from the first one.
    pub fn finger_gender(&self, index: usize) -> Gender {
        if index % 2 == 0 {
            self.first_finger_gender
        } else {
            self.first_finger_gender.opposite()
        }
    }
}

/// Bounding volume declared by a generic connector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Bounding {
    Point,
    /// Half extents along x, y, z.
    Box(Vec3),
    Cube {
        size: f32,
    },
    Cylinder {
        radius: f32,
        length: f32,
    },
    Sphere {
        radius: f32,
    },
}

/// A snap volume matched by group, gender and position only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenericConnector {
    pub gender: Gender,
    pub bounding: Bounding,
}

impl GenericConnector {
    pub fn new(gender: Gender, bounding: Bounding) -> Self {
        Self { gender, bounding }
    }
}

/// Payload of a connector, one variant per connector family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConnectorKind {
    Cylindrical(CylindricalConnector),
    Clip(ClipConnector),
    Finger(FingerConnector),
    Generic(GenericConnector),
}

/// Field-less tag of a [`ConnectorKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorType {
    Cylindrical,
    Clip,
    Finger,
    Generic,
}

impl ConnectorKind {
    pub fn connector_type(&self) -> ConnectorType {
        match self {
            ConnectorKind::Cylindrical(_) => ConnectorType::Cylindrical,
            ConnectorKind::Clip(_) => ConnectorType::Clip,
            ConnectorKind::Finger(_) => ConnectorType::Finger,
            ConnectorKind::Generic(_) => ConnectorType::Generic,
        }
    }
}

impl From<CylindricalConnector> for ConnectorKind {
    fn from(value: CylindricalConnector) -> Self {
        ConnectorKind::Cylindrical(value)
    }
}

impl From<ClipConnector> for ConnectorKind {
    fn from(value: ClipConnector) -> Self {
        ConnectorKind::Clip(value)
    }
}

impl From<FingerConnector> for ConnectorKind {
    fn from(value: FingerConnector) -> Self {
        ConnectorKind::Finger(value)
    }
}

impl From<GenericConnector> for ConnectorKind {
    fn from(value: GenericConnector) -> Self {
        ConnectorKind::Generic(value)
    }
}

/// A connector of a part definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    /// Only connectors sharing a group may match (generic and finger families).
    pub group: String,
    /// Anchor point in the owning part's frame.
    pub start: Vec3,
    /// Principal axis, normalized on construction. Zero if the input was degenerate.
    pub direction: Vec3,
    /// Where the connector was declared, for diagnostics.
    pub source_trace: String,
    pub kind: ConnectorKind,
}

impl Connector {
    /// Creates a connector. `direction` is normalized; a zero-length or
    /// non-finite direction becomes `Vec3::ZERO` and the connector never matches.
    pub fn new(
        group: impl Into<String>,
        start: Vec3,
        direction: Vec3,
        kind: impl Into<ConnectorKind>,
    ) -> Self {
        Self {
            group: group.into(),
            start,
            direction: direction.normalize_or_zero(),
            source_trace: String::new(),
            kind: kind.into(),
        }
    }

    /// Records where the connector was declared (builder pattern).
    pub fn with_source_trace(mut self, trace: impl Into<String>) -> Self {
        self.source_trace = trace.into();
        self
    }

    pub fn connector_type(&self) -> ConnectorType {
        self.kind.connector_type()
    }

    /// Declared gender, if the kind has a single one.
    pub fn gender(&self) -> Option<Gender> {
        match &self.kind {
            ConnectorKind::Cylindrical(c) => Some(c.gender),
            ConnectorKind::Generic(g) => Some(g.gender),
            ConnectorKind::Clip(_) | ConnectorKind::Finger(_) => None,
        }
    }

    /// Extent of the connector along its axis. Zero for generic connectors.
    pub fn axial_length(&self) -> f32 {
        match &self.kind {
            ConnectorKind::Cylindrical(c) => c.total_length(),
            ConnectorKind::Clip(c) => c.width,
            ConnectorKind::Finger(f) => f.total_width(),
            ConnectorKind::Generic(_) => 0.0,
        }
    }

    /// Clone with the start moved by `offset`, as used by grid expansion.
    pub fn offset(&self, offset: Vec3) -> Self {
        let mut copy = self.clone();
        copy.start += offset;
        copy
    }

    /// Clone expressed in the frame `transformation` maps into.
    ///
    /// Radii and axial lengths are rescaled by the transform's scale
    /// perpendicular to and along the connector axis.
    pub fn transformed(&self, transformation: &Mat4) -> Self {
        let (radius_factor, length_factor) = scale_factors(transformation, self.direction);
        let kind = match &self.kind {
            ConnectorKind::Cylindrical(c) => {
                let mut c = c.clone();
                for part in &mut c.parts {
                    part.radius *= radius_factor;
                    part.length *= length_factor;
                }
                ConnectorKind::Cylindrical(c)
            }
            ConnectorKind::Clip(c) => ConnectorKind::Clip(ClipConnector {
                radius: c.radius * radius_factor,
                width: c.width * length_factor,
                slide: c.slide,
                opening_direction: transformation
                    .transform_vector3(c.opening_direction)
                    .normalize_or_zero(),
            }),
            ConnectorKind::Finger(f) => ConnectorKind::Finger(FingerConnector {
                first_finger_gender: f.first_finger_gender,
                radius: f.radius * radius_factor,
                finger_widths: f.finger_widths.iter().map(|w| w * length_factor).collect(),
            }),
            ConnectorKind::Generic(g) => ConnectorKind::Generic(g.clone()),
        };
        Self {
            group: self.group.clone(),
            start: transformation.transform_point3(self.start),
            direction: transformation
                .transform_vector3(self.direction)
                .normalize_or_zero(),
            source_trace: self.source_trace.clone(),
            kind,
        }
    }
}

/// Scale of `transformation` perpendicular to and along `direction`.
fn scale_factors(transformation: &Mat4, direction: Vec3) -> (f32, f32) {
    let unit_columns = [
        transformation.x_axis,
        transformation.y_axis,
        transformation.z_axis,
    ]
    .iter()
    .all(|c| (c.truncate().length() - 1.0).abs() < 0.001);
    let axis = direction.normalize_or_zero();
    if unit_columns || axis == Vec3::ZERO {
        return (1.0, 1.0);
    }
    let perpendicular = axis.any_orthonormal_vector();
    (
        transformation.transform_vector3(perpendicular).length(),
        transformation.transform_vector3(axis).length(),
    )
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConnectorKind::Cylindrical(c) => {
                write!(
                    f,
                    "cylindrical[gender={}, group={}, openStart={}, openEnd={}, slide={}, start={}, direction={}, parts=[",
                    c.gender, self.group, c.open_start, c.open_end, c.slide, self.start, self.direction
                )?;
                for (i, p) in c.parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(
                        f,
                        "{:?}[r={}, fr={}, l={}]",
                        p.shape_type, p.radius, p.flexible_radius, p.length
                    )?;
                }
                f.write_str("]]")
            }
            ConnectorKind::Clip(c) => write!(
                f,
                "clip[group={}, radius={}, width={}, slide={}, start={}, direction={}]",
                self.group, c.radius, c.width, c.slide, self.start, self.direction
            ),
            ConnectorKind::Finger(fg) => write!(
                f,
                "finger[group={}, firstFingerGender={}, radius={}, fingerWidths={:?}, start={}, direction={}]",
                self.group, fg.first_finger_gender, fg.radius, fg.finger_widths, self.start, self.direction
            ),
            ConnectorKind::Generic(g) => write!(
                f,
                "generic[group={}, gender={}, bounding={:?}, start={}, direction={}]",
                self.group, g.gender, g.bounding, self.start, self.direction
            ),
        }
    }
}
