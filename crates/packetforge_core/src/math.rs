//! Float vectors carried on the wire.
//!
//! The stream writes each component as a little-endian `f32`: 8 bytes for
//! [`Vec2`], 12 for [`Vec3`]. Both are also `Pod` for raw buffer copies.

use bytemuck::{Pod, Zeroable};

/// Planar vector.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vec2 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
}

impl Vec2 {
    /// All zeros.
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Builds a vector from components.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Spatial vector: positions, velocities, directions.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// All zeros.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Builds a vector from components.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_sizes() {
        assert_eq!(bytemuck::bytes_of(&Vec2::new(1.0, 2.0)).len(), 8);
        assert_eq!(bytemuck::bytes_of(&Vec3::new(1.0, 2.0, 3.0)).len(), 12);
    }

    #[test]
    fn test_bytes_are_components_in_order() {
        let v = Vec3::new(1.0, -2.0, 0.5);
        let bytes = bytemuck::bytes_of(&v);
        assert_eq!(&bytes[..4], &1.0f32.to_ne_bytes());
        assert_eq!(&bytes[8..], &0.5f32.to_ne_bytes());
        assert_eq!(Vec3::default(), Vec3::ZERO);
    }
}
