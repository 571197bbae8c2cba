//! Fixed-Point Math
//!
//! Q16.16 fixed-point scalar and 2D vector for hold-anchor positions.
//! The authority never touches floating point: anchors arrive from peers
//! as raw Fixed pairs and all distance checks compare squared values,
//! so identical inputs produce identical break decisions on any platform.

use serde::{Serialize, Deserialize};

/// Q16.16 fixed-point number stored as i32.
///
/// 65536 = 1.0, range approximately [-32768.0, +32768.0).
pub type Fixed = i32;

/// 1.0 in fixed-point
pub const FIXED_ONE: Fixed = 65536;

/// 0.5 in fixed-point
pub const FIXED_HALF: Fixed = 32768;

/// Scale factor (2^16)
pub const FIXED_SCALE: i64 = 65536;

/// Default breaking distance for held objects (3.0 world units).
pub const DEFAULT_BREAK_DISTANCE: Fixed = 3 * FIXED_ONE;

/// Multiply two fixed-point numbers.
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    ((a as i64 * b as i64) >> 16) as Fixed
}

/// Convert a float to fixed-point (for configs and tests only).
#[inline]
pub fn fixed_from_float(f: f32) -> Fixed {
    (f as f64 * FIXED_SCALE as f64) as Fixed
}

/// Convert fixed-point to float (display only).
#[inline]
pub fn fixed_to_float(f: Fixed) -> f32 {
    f as f32 / FIXED_SCALE as f32
}

/// 2D vector with fixed-point components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedVec2 {
    /// X component
    pub x: Fixed,
    /// Y component
    pub y: Fixed,
}

impl FixedVec2 {
    /// Zero vector.
    pub const ZERO: FixedVec2 = FixedVec2 { x: 0, y: 0 };

    /// Create from components.
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Component-wise addition (wrapping, like all anchor math).
    #[inline]
    pub fn add(self, other: FixedVec2) -> FixedVec2 {
        FixedVec2 {
            x: self.x.wrapping_add(other.x),
            y: self.y.wrapping_add(other.y),
        }
    }

    /// Component-wise subtraction.
    #[inline]
    pub fn sub(self, other: FixedVec2) -> FixedVec2 {
        FixedVec2 {
            x: self.x.wrapping_sub(other.x),
            y: self.y.wrapping_sub(other.y),
        }
    }

    /// Squared length. Clamped instead of wrapping so comparisons stay sane.
    #[inline]
    pub fn length_squared(self) -> Fixed {
        let xx = fixed_mul(self.x, self.x) as i64;
        let yy = fixed_mul(self.y, self.y) as i64;
        (xx + yy).clamp(i32::MIN as i64, i32::MAX as i64) as Fixed
    }

    /// Squared distance to another point.
    #[inline]
    pub fn distance_squared(self, other: FixedVec2) -> Fixed {
        self.sub(other).length_squared()
    }

    /// Convert to floats (display only).
    pub fn to_floats(self) -> (f32, f32) {
        (fixed_to_float(self.x), fixed_to_float(self.y))
    }
}

/// Check whether two points are within `max_distance` of each other.
///
/// Compares squared values; never computes a square root.
#[inline]
pub fn within_distance(a: FixedVec2, b: FixedVec2, max_distance: Fixed) -> bool {
    a.distance_squared(b) <= fixed_mul(max_distance, max_distance)
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_within_distance_symmetric(
            ax in -100 * FIXED_ONE..100 * FIXED_ONE,
            ay in -100 * FIXED_ONE..100 * FIXED_ONE,
            bx in -100 * FIXED_ONE..100 * FIXED_ONE,
            by in -100 * FIXED_ONE..100 * FIXED_ONE,
            max in 0..10 * FIXED_ONE,
        ) {
            let a = FixedVec2::new(ax, ay);
            let b = FixedVec2::new(bx, by);
            prop_assert_eq!(within_distance(a, b, max), within_distance(b, a, max));
        }

        #[test]
        fn test_point_always_within_of_itself(
            x in -100 * FIXED_ONE..100 * FIXED_ONE,
            y in -100 * FIXED_ONE..100 * FIXED_ONE,
            max in 0..10 * FIXED_ONE,
        ) {
            let p = FixedVec2::new(x, y);
            prop_assert!(within_distance(p, p, max));
        }
    }
}
