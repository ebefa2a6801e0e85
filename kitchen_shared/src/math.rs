//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics.

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// 2D vector as it appears on the wire (`[x, y]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn len(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Scales the vector down to unit length if it is longer than that.
    pub fn clamp_unit(self) -> Self {
        let len = self.len();
        if len > 1.0 {
            Self::new(self.x / len, self.y / len)
        } else {
            self
        }
    }

    /// Lifts a kitchen-plane coordinate into the scene: `(x, y)` becomes `(x, 0, y)`.
    pub fn to_plane(self) -> Vec3 {
        Vec3::new(self.x, 0.0, self.y)
    }
}

impl From<[f32; 2]> for Vec2 {
    fn from(v: [f32; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<Vec2> for [f32; 2] {
    fn from(v: Vec2) -> Self {
        [v.x, v.y]
    }
}

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

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn len(self) -> f32 {
        self.len_sq().sqrt()
    }

    pub fn distance(self, to: Self) -> f32 {
        (to - self).len()
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }

    /// Moves toward `to` by at most `max_step`, landing exactly on `to` when
    /// it is within reach.
    pub fn move_towards(self, to: Self, max_step: f32) -> Self {
        let delta = to - self;
        let dist = delta.len();
        if dist <= max_step || dist == 0.0 {
            to
        } else {
            self + delta * (max_step / dist)
        }
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation of `radians` about the +Y (up) axis.
    pub fn from_yaw(radians: f32) -> Self {
        let half = radians * 0.5;
        Self {
            x: 0.0,
            y: half.sin(),
            z: 0.0,
            w: half.cos(),
        }
    }

    /// Rotation that turns +Z to face along a kitchen-plane direction.
    /// A zero direction yields the identity.
    pub fn from_facing(dir: Vec2) -> Self {
        if dir.x == 0.0 && dir.y == 0.0 {
            return Self::IDENTITY;
        }
        Self::from_yaw(dir.x.atan2(dir.y))
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z + self.w * rhs.w
    }

    pub fn normalize(self) -> Self {
        let len = self.dot(self).sqrt();
        if len == 0.0 {
            return Self::IDENTITY;
        }
        Self {
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
            w: self.w / len,
        }
    }

    /// Angle in radians of the shortest rotation between `self` and `to`.
    pub fn angle_to(self, to: Self) -> f32 {
        let d = self.dot(to).abs().min(1.0);
        2.0 * d.acos()
    }

    /// Spherical interpolation along the shortest arc. `t` is clamped to `[0, 1]`.
    pub fn slerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mut to = to;
        let mut cos = self.dot(to);
        if cos < 0.0 {
            to = -to;
            cos = -cos;
        }
        if cos > 0.9995 {
            // Nearly parallel; fall back to normalized lerp.
            return Self {
                x: self.x + (to.x - self.x) * t,
                y: self.y + (to.y - self.y) * t,
                z: self.z + (to.z - self.z) * t,
                w: self.w + (to.w - self.w) * t,
            }
            .normalize();
        }
        let theta = cos.acos();
        let sin = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin;
        let b = (t * theta).sin() / sin;
        Self {
            x: self.x * a + to.x * b,
            y: self.y * a + to.y * b,
            z: self.z * a + to.z * b,
            w: self.w * a + to.w * b,
        }
    }

    /// Rotates toward `to` by at most `max_radians`.
    pub fn rotate_towards(self, to: Self, max_radians: f32) -> Self {
        let angle = self.angle_to(to);
        if angle <= max_radians || angle == 0.0 {
            to
        } else {
            self.slerp(to, max_radians / angle)
        }
    }
}

impl Neg for Quat {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            w: -self.w,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 4.0, 6.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn move_towards_never_overshoots() {
        let a = Vec3::ZERO;
        let b = Vec3::new(3.0, 0.0, 4.0);
        assert!((a.move_towards(b, 1.0).len() - 1.0).abs() < 1e-6);
        assert_eq!(a.move_towards(b, 10.0), b);
    }

    #[test]
    fn vec2_decodes_from_array() {
        let v: Vec2 = serde_json::from_str("[1.5, -2.0]").unwrap();
        assert_eq!(v, Vec2::new(1.5, -2.0));
        assert_eq!(serde_json::to_string(&v).unwrap(), "[1.5,-2.0]");
    }

    #[test]
    fn facing_maps_to_yaw() {
        let east = Quat::from_facing(Vec2::new(1.0, 0.0));
        assert!((Quat::IDENTITY.angle_to(east) - FRAC_PI_2).abs() < 1e-5);
        assert_eq!(Quat::from_facing(Vec2::ZERO), Quat::IDENTITY);
    }

    #[test]
    fn rotate_towards_is_bounded() {
        let target = Quat::from_yaw(FRAC_PI_2);
        let step = Quat::IDENTITY.rotate_towards(target, 0.1);
        assert!((Quat::IDENTITY.angle_to(step) - 0.1).abs() < 1e-4);
        assert_eq!(Quat::IDENTITY.rotate_towards(target, 4.0), target);
    }
}
