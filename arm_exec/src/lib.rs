//! # Arm library.
//!
//! This library allows other crates in the workspace (and the benchmarks) to
//! access items defined inside the arm crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Arm kinematics - forward and inverse kinematics of the 4 axis arm
pub mod arm_kin;

/// Arm control module - sequences joint demands to move the arm to a target and back home
pub mod arm_ctrl;
