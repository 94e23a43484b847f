//! Avatar scene geometry and idle animation
//!
//! Renderer-agnostic: callers map [`Geometry`] and [`Placement`] onto
//! whatever they draw with.

use crate::session::{AvatarParts, PartKind, Shape};

/// Primitive mesh for one part
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum Geometry {
    Sphere { radius: f32 },
    Cube { size: f32 },
    Cylinder { radius: f32, height: f32 },
}

/// Geometry for a shape
pub fn geometry_for(shape: Shape) -> Geometry {
    match shape {
        Shape::Sphere => Geometry::Sphere { radius: 0.5 },
        Shape::Cube => Geometry::Cube { size: 0.8 },
        Shape::Cylinder => Geometry::Cylinder {
            radius: 0.4,
            height: 1.0,
        },
    }
}

impl Geometry {
    /// Width and height of the silhouette seen from the front
    pub fn extent(&self) -> (f32, f32) {
        match *self {
            Geometry::Sphere { radius } => (radius * 2.0, radius * 2.0),
            Geometry::Cube { size } => (size, size),
            Geometry::Cylinder { radius, height } => (radius * 2.0, height),
        }
    }
}

/// A colored primitive at a position in avatar space
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Which part this is
    pub kind: PartKind,
    /// Mesh to draw
    pub geometry: Geometry,
    /// x, y, z relative to the avatar origin
    pub position: [f32; 3],
    /// sRGB fill
    pub color: [u8; 3],
}

const HEAD_OFFSET: [f32; 3] = [0.0, 1.5, 0.0];
const BODY_OFFSET: [f32; 3] = [0.0, 0.0, 0.0];
const HAND_SPREAD: f32 = 0.8;

/// Lay out every part; hands produce two placements, left then right
pub fn layout(parts: &AvatarParts) -> Vec<Placement> {
    let place = |kind: PartKind, position: [f32; 3]| {
        let part = parts.get(kind);
        Placement {
            kind,
            geometry: geometry_for(part.shape),
            position,
            color: parse_color(&part.color),
        }
    };

    vec![
        place(PartKind::Head, HEAD_OFFSET),
        place(PartKind::Body, BODY_OFFSET),
        place(PartKind::Hands, [-HAND_SPREAD, 0.0, 0.0]),
        place(PartKind::Hands, [HAND_SPREAD, 0.0, 0.0]),
    ]
}

/// Whole-avatar transform for the idle animation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Vertical offset
    pub bob: f32,
    /// Rotation about the vertical axis, radians
    pub yaw: f32,
}

const BOB_AMPLITUDE: f32 = 0.1;
const YAW_AMPLITUDE: f32 = 0.1;

/// Pose at `t` seconds; speaking makes the bob livelier
pub fn idle_pose(t: f32, speaking: bool) -> Pose {
    let amplitude = if speaking {
        BOB_AMPLITUDE * (1.0 + 0.5 * (t * 4.0).sin().abs())
    } else {
        BOB_AMPLITUDE
    };
    Pose {
        bob: t.sin() * amplitude,
        yaw: (t * 0.5).sin() * YAW_AMPLITUDE,
    }
}

/// Parse `#RRGGBB` or `#RGB`; anything else is white
pub fn parse_color(color: &str) -> [u8; 3] {
    const WHITE: [u8; 3] = [0xFF, 0xFF, 0xFF];
    let Some(hex) = color.trim().strip_prefix('#') else {
        return WHITE;
    };
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return WHITE;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    let rgb = match hex.len() {
        6 => (channel(&hex[0..2]), channel(&hex[2..4]), channel(&hex[4..6])),
        3 => {
            let doubled = |i: usize| channel(&hex[i..=i].repeat(2));
            (doubled(0), doubled(1), doubled(2))
        }
        _ => return WHITE,
    };
    match rgb {
        (Some(r), Some(g), Some(b)) => [r, g, b],
        _ => WHITE,
    }
}
