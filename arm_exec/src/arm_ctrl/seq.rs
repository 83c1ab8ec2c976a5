//! # Staged command sequences
//!
//! A sequence is a list of stages, each pairing a [`Trigger`] with an
//! [`Action`]. The owner steps the sequence once per control cycle and
//! applies the actions which fall due.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::Params;
use crate::arm_kin::{JointAngles, NUM_JOINTS};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Order in which joints are commanded when moving to a target.
pub const MOVE_ORDER: [usize; NUM_JOINTS] = [0, 1, 2, 3];

/// Order in which joints are commanded when returning home.
pub const HOME_ORDER: [usize; NUM_JOINTS] = [3, 2, 1, 0];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Condition under which a stage fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    /// Fire once the sequence has run the given number of cycles.
    AtCycle(u64),
}

/// Effect of a fired stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Latch a new position demand for a joint (zero based index).
    SetJoint { joint: usize, pos_rad: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub trigger: Trigger,
    pub action: Action,
}

/// A sequence of stages run against the control cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedSequence {
    stages: Vec<Stage>,

    /// Index of the first stage which has not fired yet.
    next_stage: usize,

    /// Number of cycles the sequence has been stepped.
    cycle: u64,

    length_cycles: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Trigger {
    fn cycle(&self) -> u64 {
        match self {
            Trigger::AtCycle(c) => *c,
        }
    }
}

impl StagedSequence {
    /// Create a new sequence.
    ///
    /// Stages are ordered by their trigger cycle, stages sharing a cycle keep
    /// the order given. The sequence lasts at least until the last stage.
    pub fn new(mut stages: Vec<Stage>, length_cycles: u64) -> Self {
        stages.sort_by_key(|s| s.trigger.cycle());

        let last_cycle = stages.last().map(|s| s.trigger.cycle() + 1).unwrap_or(0);

        Self {
            stages,
            next_stage: 0,
            cycle: 0,
            length_cycles: length_cycles.max(last_cycle),
        }
    }

    /// Build a sequence which drives the joints to `target` one at a time,
    /// in the given order, at the stage cycles set in the parameters.
    pub fn joint_by_joint(
        target: &JointAngles,
        order: &[usize; NUM_JOINTS],
        params: &Params,
    ) -> Self {
        let stages = order
            .iter()
            .zip(params.stage_cycles.iter())
            .map(|(&joint, &cycle)| Stage {
                trigger: Trigger::AtCycle(cycle),
                action: Action::SetJoint {
                    joint,
                    pos_rad: target[joint],
                },
            })
            .collect();

        Self::new(stages, params.sequence_length_cycles)
    }

    /// Advance the sequence by one cycle, returning the actions which fired.
    pub fn step(&mut self) -> Vec<Action> {
        let mut fired = Vec::new();

        while let Some(stage) = self.stages.get(self.next_stage) {
            if stage.trigger.cycle() > self.cycle {
                break;
            }
            fired.push(stage.action);
            self.next_stage += 1;
        }

        self.cycle += 1;

        fired
    }

    /// `true` once every stage has fired and the sequence has run its full
    /// length.
    pub fn is_complete(&self) -> bool {
        self.next_stage >= self.stages.len() && self.cycle >= self.length_cycles
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}
