//! # Arm control commands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command that can be completed by arm control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
pub enum ArmCmd {
    /// Move every joint to the given angle.
    ///
    /// Joints are moved one at a time from the base to the wrist.
    #[structopt(name = "rot")]
    BasicRotation {
        /// Angle of the base joint in radians.
        #[structopt(allow_hyphen_values = true)]
        theta_1_rad: f64,

        /// Angle of the shoulder joint in radians.
        #[structopt(allow_hyphen_values = true)]
        theta_2_rad: f64,

        /// Angle of the elbow joint in radians.
        #[structopt(allow_hyphen_values = true)]
        theta_3_rad: f64,

        /// Angle of the wrist joint in radians.
        #[structopt(allow_hyphen_values = true)]
        theta_4_rad: f64,
    },

    /// Move the end effector to a position in the arm base frame.
    ///
    /// The joint angles are computed by inverse kinematics, then applied
    /// like a basic rotation.
    #[structopt(name = "move")]
    InverseKinematics {
        /// Units: meters
        #[structopt(allow_hyphen_values = true)]
        x_m: f64,

        /// Units: meters
        #[structopt(allow_hyphen_values = true)]
        y_m: f64,

        /// Units: meters
        #[structopt(allow_hyphen_values = true)]
        z_m: f64,
    },

    /// Return every joint to its home position, from the wrist to the base.
    #[structopt(name = "home")]
    ReturnHome,

    /// Stop the arm, abandoning any sequence in progress and holding the
    /// current demands.
    #[structopt(name = "stop")]
    Stop,
}
