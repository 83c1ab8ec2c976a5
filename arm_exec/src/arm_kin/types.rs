//! Joint space and task space data types

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Vector3, Vector4};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

// Internal
use super::NUM_JOINTS;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One configuration of the arm, the angle of every joint from the base
/// (index 0, theta 1) to the wrist (index 3, theta 4).
///
/// No bounds are implied, joint limits are enforced by arm control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointAngles {
    /// Absolute position of each joint relative to its home (zero) position.
    ///
    /// Units: radians
    pub pos_rad: [f64; NUM_JOINTS],
}

/// Position of the end effector in the arm base frame.
///
/// Orientation is not modelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Units: meters,
    /// Frame: Arm base
    pub x_m: f64,

    /// Units: meters,
    /// Frame: Arm base
    pub y_m: f64,

    /// Units: meters,
    /// Frame: Arm base
    pub z_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl JointAngles {
    pub fn new(theta_1: f64, theta_2: f64, theta_3: f64, theta_4: f64) -> Self {
        Self {
            pos_rad: [theta_1, theta_2, theta_3, theta_4],
        }
    }

    /// The home configuration, all joints at zero.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_vector(v: &Vector4<f64>) -> Self {
        Self {
            pos_rad: [v[0], v[1], v[2], v[3]],
        }
    }

    pub fn to_vector(&self) -> Vector4<f64> {
        Vector4::from(self.pos_rad)
    }

    /// Sum of the absolute differences between each joint angle of `self`
    /// and `other`.
    ///
    /// Units: radians
    pub fn l1_dist(&self, other: &JointAngles) -> f64 {
        self.pos_rad
            .iter()
            .zip(other.pos_rad.iter())
            .map(|(a, b)| (a - b).abs())
            .sum()
    }

    /// `true` if every angle is finite.
    pub fn is_finite(&self) -> bool {
        self.pos_rad.iter().all(|p| p.is_finite())
    }
}

impl Index<usize> for JointAngles {
    type Output = f64;

    fn index(&self, joint: usize) -> &f64 {
        &self.pos_rad[joint]
    }
}

impl IndexMut<usize> for JointAngles {
    fn index_mut(&mut self, joint: usize) -> &mut f64 {
        &mut self.pos_rad[joint]
    }
}

impl fmt::Display for JointAngles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.6}, {:.6}, {:.6}, {:.6}] rad",
            self.pos_rad[0], self.pos_rad[1], self.pos_rad[2], self.pos_rad[3]
        )
    }
}

impl Position {
    pub fn new(x_m: f64, y_m: f64, z_m: f64) -> Self {
        Self { x_m, y_m, z_m }
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x_m, self.y_m, self.z_m)
    }

    /// Euclidian distance between two positions.
    ///
    /// Units: meters
    pub fn dist(&self, other: &Position) -> f64 {
        (self.to_vector() - other.to_vector()).norm()
    }

    /// `true` if every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.x_m.is_finite() && self.y_m.is_finite() && self.z_m.is_finite()
    }
}

impl From<Vector3<f64>> for Position {
    fn from(v: Vector3<f64>) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6}, {:.6}) m", self.x_m, self.y_m, self.z_m)
    }
}
