//! Arm control module
//!
//! Arm control turns a command (a target position, a set of joint angles, or
//! a return to home) into a staged sequence of joint demands. One joint is
//! moved at a time at fixed cycle offsets, the kinematics themselves live in
//! [`crate::arm_kin`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cmd;
mod params;
mod seq;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use cmd::*;
pub use params::*;
pub use seq::*;
pub use state::*;

use crate::arm_kin::{ConfigError, IkError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during ArmCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum ArmCtrlError {
    #[error("ArmCtrl has not been initialised")]
    NotInitialised,

    #[error("Recieved an invalid arm command: {0}")]
    InvalidArmCmd(String),

    #[error("Cannot compute the joint angles for the target: {0}")]
    IkError(#[from] IkError),

    #[error(
        "Joint {} has no equivalent of {:.4} rad within its limits",
        .joint + 1,
        .pos_rad
    )]
    OutsideLimits { joint: usize, pos_rad: f64 },
}

/// Possible errors that can occur during ArmCtrl initialisation.
#[derive(Debug, thiserror::Error)]
pub enum ArmCtrlInitError {
    #[error("Cannot load the parameters: {0}")]
    LoadError(#[from] util::params::LoadError),

    #[error("Invalid kinematics parameters: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Invalid arm control parameters: {0}")]
    InvalidParams(String),
}
