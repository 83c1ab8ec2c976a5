//! Parameters structure for ArmCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::arm_kin::NUM_JOINTS;
use serde::{Serialize, Deserialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Arm control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// Kinematics parameter file, relative to the params directory.
    pub kin_params_file: String,

    // ---- CAPABILITIES ----
    /// Maximum joint absolute position (highest positive value)
    ///
    /// Units: radians
    pub max_abs_pos_rad: [f64; NUM_JOINTS],

    /// Minimum joint absolute position (lowest negative value)
    ///
    /// Units: radians
    pub min_abs_pos_rad: [f64; NUM_JOINTS],

    /// Default SAFE position of the joints, the target of a return to home.
    ///
    /// Units: radians
    pub home_pos_rad: [f64; NUM_JOINTS],

    // ---- SEQUENCING ----
    /// Cycle, counted from the start of a sequence, at which the nth joint
    /// of the sequence is commanded.
    pub stage_cycles: [u64; NUM_JOINTS],

    /// Total length of a sequence. Must not be less than the last stage
    /// cycle.
    pub sequence_length_cycles: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            kin_params_file: String::from("arm_kin.toml"),
            max_abs_pos_rad: [std::f64::consts::PI; NUM_JOINTS],
            min_abs_pos_rad: [-std::f64::consts::PI; NUM_JOINTS],
            home_pos_rad: [0.0; NUM_JOINTS],
            stage_cycles: [10, 20, 30, 40],
            sequence_length_cycles: 50,
        }
    }
}

impl Params {
    /// Check the parameters are consistent, returning a description of the
    /// first problem found.
    pub fn validate(&self) -> Result<(), String> {
        for i in 0..NUM_JOINTS {
            if self.min_abs_pos_rad[i] > self.max_abs_pos_rad[i] {
                return Err(format!("joint {} minimum position above its maximum", i + 1));
            }
            if self.home_pos_rad[i] < self.min_abs_pos_rad[i]
                || self.home_pos_rad[i] > self.max_abs_pos_rad[i]
            {
                return Err(format!("joint {} home position outside its limits", i + 1));
            }
        }

        if self.stage_cycles.windows(2).any(|w| w[0] > w[1]) {
            return Err(String::from("stage_cycles must not decrease"));
        }
        if self.stage_cycles.iter().any(|c| *c > self.sequence_length_cycles) {
            return Err(String::from("a stage is after the end of the sequence"));
        }

        Ok(())
    }
}
