//! Parameters structures for the arm kinematics

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::NUM_JOINTS;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Contents of the arm kinematics parameter file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Params {
    /// Calibrated geometry of the arm.
    pub model: ModelParams,

    /// Inverse kinematics solver settings.
    #[serde(default)]
    pub ik: IkParams,
}

/// Calibration constants describing the geometry of the arm.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    // ---- GEOMETRY ----
    /// Screw axis of each joint, ordered from the base to the wrist.
    pub screw_axes: Vec<ScrewAxisParams>,

    /// Pose of the end effector when all joints are at zero, as a row-major
    /// homogeneous transform.
    ///
    /// Units: meters (translation column)
    pub home_transform: [[f64; 4]; 4],
}

/// Screw axis of a single revolute joint.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ScrewAxisParams {
    /// Skew-symmetric matrix of the joint's unit rotation axis, row-major.
    pub rot: [[f64; 3]; 3],

    /// Linear part of the screw axis, `-w x q` for a point `q` on the axis.
    ///
    /// Units: meters
    pub lin_m: [f64; 3],
}

/// Settings for the inverse kinematics solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IkParams {
    // ---- CONVERGENCE ----
    /// Position error below which a solution is accepted.
    ///
    /// Units: meters
    pub tolerance_m: f64,

    /// Maximum number of iterations from any single seed.
    pub max_iterations: usize,

    /// Damping factor (lambda) of the damped least squares step.
    pub damping: f64,

    /// Maximum norm of a single joint step.
    ///
    /// Units: radians
    pub max_step_rad: f64,

    /// A seed whose step norm drops below this value before converging is
    /// considered stalled.
    ///
    /// Units: radians
    pub stall_step_rad: f64,

    // ---- SOLUTION SELECTION ----
    /// Number of extra seeds tried after the reference configuration.
    pub num_restarts: usize,

    /// If no seed converges and the best residual is above this value the
    /// target is reported as unreachable rather than not converged.
    ///
    /// Units: meters
    pub unreachable_residual_m: f64,

    /// Reference configuration. Used as the first seed and to choose between
    /// multiple solutions, the closest one to this configuration wins.
    ///
    /// Units: radians
    pub reference_rad: [f64; NUM_JOINTS],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for IkParams {
    fn default() -> Self {
        Self {
            tolerance_m: 1e-9,
            max_iterations: 200,
            damping: 0.01,
            max_step_rad: 0.5,
            stall_step_rad: 1e-12,
            num_restarts: 16,
            unreachable_residual_m: 1e-3,
            reference_rad: [0.0; NUM_JOINTS],
        }
    }
}

impl ModelParams {
    /// Calibration constants of the reference arm.
    ///
    /// These match `params/arm_kin.toml`.
    pub fn reference() -> Self {
        Self {
            screw_axes: vec![
                ScrewAxisParams {
                    rot: [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
                    lin_m: [0.012, 0.0, 0.0],
                },
                ScrewAxisParams {
                    rot: [[0.0, 0.0, 1.0], [0.0, 0.0, 0.0], [-1.0, 0.0, 0.0]],
                    lin_m: [-0.077, 0.0, 0.012],
                },
                ScrewAxisParams {
                    rot: [[0.0, 0.0, 1.0], [0.0, 0.0, 0.0], [-1.0, 0.0, 0.0]],
                    lin_m: [-0.205, 0.0, 0.036],
                },
                ScrewAxisParams {
                    rot: [[0.0, 0.0, 1.0], [0.0, 0.0, 0.0], [-1.0, 0.0, 0.0]],
                    lin_m: [-0.205, 0.0, 0.16],
                },
            ],
            home_transform: [
                [1.0, 0.0, 0.0, 0.16],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.205],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }
}
