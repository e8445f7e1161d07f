//! Math types.
//!
//! World space is Y-up. The board lies on the XZ plane: a server cell `(x, y)`
//! maps to `Vec3::new(x, 0.0, y)`. Headings are yaw angles in degrees about
//! +Y, increasing clockwise when seen from above, with 0° facing +Z.

use serde::{Deserialize, Serialize};

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Lifts a board cell onto the ground plane.
    pub fn from_cell(x: i32, y: i32) -> Self {
        Self::new(x as f32, 0.0, y as f32)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn distance(self, rhs: Self) -> f32 {
        (self - rhs).len_sq().sqrt()
    }

    /// Linear interpolation. `t` is not clamped: values past 1.0 extrapolate
    /// beyond `to`.
    pub fn lerp(self, to: Self, t: f32) -> Self {
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }

    /// Rotates this point around `pivot` about the vertical axis.
    pub fn rotate_around_y(self, pivot: Self, degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let dx = self.x - pivot.x;
        let dz = self.z - pivot.z;
        Self::new(
            pivot.x + dx * cos + dz * sin,
            self.y,
            pivot.z - dx * sin + dz * cos,
        )
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Wraps a yaw angle into `[0, 360)`.
pub fn normalize_degrees(deg: f32) -> f32 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
