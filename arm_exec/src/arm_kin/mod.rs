//! # Arm kinematics module
//!
//! Forward and inverse kinematics of the 4 axis arm, expressed with the
//! product of exponentials formulation. Everything in this module is a pure
//! function of an immutable [`KinematicModel`], so a model or an [`InvKin`]
//! solver can be shared freely between threads.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod fwd_kin;
mod inv_kin;
mod model;
mod params;
mod types;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use inv_kin::*;
pub use model::*;
pub use params::*;
pub use types::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of joints (rotational axes) in the kinematic chain.
pub const NUM_JOINTS: usize = 4;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while building a [`KinematicModel`] or [`InvKin`] solver
/// from its parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Expected {} screw axes, found {0}", NUM_JOINTS)]
    WrongNumAxes(usize),

    #[error("Parameter {0} contains a non-finite value")]
    NonFinite(String),

    #[error("The rotation block of screw axis {0} is not skew-symmetric")]
    NotSkewSymmetric(usize),

    #[error("The rotation axis of screw axis {0} is not a unit vector (norm = {1})")]
    DegenerateAxis(usize, f64),

    #[error("Screw axis {0} is not a pure rotation (axis . linear = {1})")]
    NotRevolute(usize, f64),

    #[error("The home transform is not a valid homogeneous transform: {0}")]
    InvalidHomeTransform(String),

    #[error("Invalid inverse kinematics parameter: {0}")]
    InvalidIkParams(String),
}

/// Errors raised by the inverse kinematics solver.
///
/// Both variants are recoverable, the caller decides whether to retry with a
/// different reference, pick another target or abort the motion.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum IkError {
    #[error("The target is outside the reachable workspace (residual {residual_m:.6} m)")]
    Unreachable {
        /// Smallest distance between the target and a reachable point that
        /// the solver found.
        ///
        /// Units: meters
        residual_m: f64,
    },

    #[error(
        "The solver did not converge after {iterations} iterations (residual {residual_m:.3e} m)"
    )]
    NotConverged {
        /// Total number of iterations performed over all seeds.
        iterations: usize,

        /// Smallest position error reached.
        ///
        /// Units: meters
        residual_m: f64,
    },
}
