//! Implementations for the ArmCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

// Internal
use super::{
    Action, ArmCmd, ArmCtrlError, ArmCtrlInitError, Params, StagedSequence, HOME_ORDER,
    MOVE_ORDER,
};
use crate::arm_kin::{self, InvKin, JointAngles, Position, NUM_JOINTS};
use util::{
    maths::clamp,
    module::{SafeMode, State},
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Arm control module state
#[derive(Default)]
pub struct ArmCtrl {
    pub(crate) params: Params,

    pub(crate) inv_kin: Option<InvKin>,

    pub(crate) report: StatusReport,

    pub(crate) current_cmd: Option<ArmCmd>,

    pub(crate) sequence: Option<StagedSequence>,

    /// The latched joint demands.
    pub(crate) output: JointAngles,
}

/// Input data to Arm Control.
#[derive(Default)]
pub struct InputData {
    /// The command to be executed, or `None` if there is no new command on
    /// this cycle.
    pub cmd: Option<ArmCmd>,
}

/// Status report for ArmCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Deserialize, Debug)]
pub struct StatusReport {
    /// Set for a joint whose commanded target was clamped to its limits.
    pub abs_pos_limited: [bool; NUM_JOINTS],

    /// A sequence is in progress.
    pub sequence_active: bool,

    /// The sequence finished on this cycle.
    pub sequence_complete: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for ArmCtrl {
    type InitData = &'static str;
    type InitError = ArmCtrlInitError;

    type InputData = InputData;
    type OutputData = JointAngles;
    type StatusReport = StatusReport;
    type ProcError = ArmCtrlError;

    /// Initialise the ArmCtrl module.
    ///
    /// Expected init data is the path to the parameter file, which names the
    /// kinematics parameter file in turn.
    fn init(
        &mut self,
        init_data: Self::InitData,
        _session: &Session,
    ) -> Result<(), Self::InitError> {
        let ctrl_params: Params = params::load(init_data)?;
        let kin_params: arm_kin::Params = params::load(&ctrl_params.kin_params_file)?;

        *self = Self::new(ctrl_params, InvKin::from_params(&kin_params)?)?;

        Ok(())
    }

    /// Perform cyclic processing of Arm Control.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        if self.inv_kin.is_none() {
            return Err(ArmCtrlError::NotInitialised);
        }

        // Clear the status report
        self.report = StatusReport::default();

        // Check to see if there's a new command
        if let Some(cmd) = &input_data.cmd {
            debug!("New ArmCtrl ArmCmd::{:?}", cmd);

            self.calc_sequence(cmd)?;

            // Update the interal copy of the command once it has started
            self.current_cmd = Some(cmd.clone());
        }

        self.step_sequence();

        Ok((self.output, self.report))
    }
}

impl SafeMode for ArmCtrl {
    /// Abandons any sequence in progress and returns the arm home.
    fn make_safe(&mut self) {
        warn!("ArmCtrl entering safe mode");
        self.return_home();
    }
}

impl ArmCtrl {
    /// Create a new arm control from already loaded parameters, with the
    /// joint demands at the home position.
    pub fn new(params: Params, inv_kin: InvKin) -> Result<Self, ArmCtrlInitError> {
        params.validate().map_err(ArmCtrlInitError::InvalidParams)?;

        Ok(Self {
            output: JointAngles {
                pos_rad: params.home_pos_rad,
            },
            params,
            inv_kin: Some(inv_kin),
            report: StatusReport::default(),
            current_cmd: None,
            sequence: None,
        })
    }

    /// Start the return to home sequence, replacing any sequence in progress.
    ///
    /// Joints are returned from the wrist to the base.
    pub fn return_home(&mut self) {
        self.current_cmd = Some(ArmCmd::ReturnHome);

        let home = JointAngles {
            pos_rad: self.params.home_pos_rad,
        };
        self.start_sequence(&home, &HOME_ORDER);
    }

    /// `true` while a sequence is running.
    pub fn is_busy(&self) -> bool {
        self.sequence.is_some()
    }

    /// The latched joint demands.
    pub fn demands(&self) -> &JointAngles {
        &self.output
    }

    /// Position of the end effector if the demands are achieved.
    pub fn demanded_position(&self) -> Option<Position> {
        self.inv_kin
            .as_ref()
            .map(|ik| ik.model().compute_pose(&self.output))
    }

    /// Calculate the sequence to run for `cmd`.
    ///
    /// On error the sequence in progress, if any, is left running.
    fn calc_sequence(&mut self, cmd: &ArmCmd) -> Result<(), ArmCtrlError> {
        match *cmd {
            ArmCmd::Stop => self.calc_stop(),
            ArmCmd::ReturnHome => self.return_home(),
            ArmCmd::BasicRotation {
                theta_1_rad,
                theta_2_rad,
                theta_3_rad,
                theta_4_rad,
            } => {
                let target = JointAngles::new(theta_1_rad, theta_2_rad, theta_3_rad, theta_4_rad);
                if !target.is_finite() {
                    return Err(ArmCtrlError::InvalidArmCmd(format!(
                        "non-finite joint angles {}",
                        target
                    )));
                }
                self.start_move(target);
            }
            ArmCmd::InverseKinematics { x_m, y_m, z_m } => {
                let target = self.calc_inverse_kinematics(&Position::new(x_m, y_m, z_m))?;
                let target = self.fit_to_limits(target)?;
                self.start_sequence(&target, &MOVE_ORDER);
            }
        }

        Ok(())
    }

    /// Solve for the joint angles reaching `target`, preferring the solution
    /// closest to the current demands.
    fn calc_inverse_kinematics(&self, target: &Position) -> Result<JointAngles, ArmCtrlError> {
        let inv_kin = self.inv_kin.as_ref().ok_or(ArmCtrlError::NotInitialised)?;

        let joints = inv_kin.compute_joints_from(target, &self.output)?;

        info!("Target {} reached at joint angles {}", target, joints);

        Ok(joints)
    }

    fn start_move(&mut self, target: JointAngles) {
        let target = self.enforce_limits(target);
        self.start_sequence(&target, &MOVE_ORDER);
    }

    fn start_sequence(&mut self, target: &JointAngles, order: &[usize; NUM_JOINTS]) {
        debug!("Starting sequence to {}", target);
        self.sequence = Some(StagedSequence::joint_by_joint(target, order, &self.params));
    }

    /// Step the running sequence, latching the demands of any stage which
    /// fires.
    fn step_sequence(&mut self) {
        let seq = match self.sequence.as_mut() {
            Some(s) => s,
            None => return,
        };

        for action in seq.step() {
            match action {
                Action::SetJoint { joint, pos_rad } => {
                    debug!("Joint {} demand set to {:.4} rad", joint + 1, pos_rad);
                    self.output.pos_rad[joint] = pos_rad;
                }
            }
        }

        if seq.is_complete() {
            self.sequence = None;
            self.report.sequence_complete = true;
            info!("Arm sequence complete, demands {}", self.output);
        } else {
            self.report.sequence_active = true;
        }
    }

    /// Enforce the limits in the arm's hardware capabilities.
    ///
    /// If a limit is reached the corresponding flag in the status report will
    /// be raised.
    fn enforce_limits(&mut self, mut target: JointAngles) -> JointAngles {
        for i in 0..NUM_JOINTS {
            let limited = clamp(
                &target[i],
                &self.params.min_abs_pos_rad[i],
                &self.params.max_abs_pos_rad[i],
            );

            if limited != target[i] {
                warn!(
                    "Joint {} target {:.4} rad limited to {:.4} rad",
                    i + 1,
                    target[i],
                    limited
                );
                target[i] = limited;
                self.report.abs_pos_limited[i] = true;
            }
        }

        target
    }

    /// Move each angle of an IK solution by whole turns into the joint
    /// limits, taking the equivalent closest to the current demand.
    ///
    /// Solutions are never clamped, a joint with no equivalent inside its
    /// limits is an error.
    fn fit_to_limits(&self, mut target: JointAngles) -> Result<JointAngles, ArmCtrlError> {
        for i in 0..NUM_JOINTS {
            let min_rad = self.params.min_abs_pos_rad[i];
            let max_rad = self.params.max_abs_pos_rad[i];

            // Range of whole turns which land inside the limits
            let first_turn = ((min_rad - target[i]) / TAU).ceil();
            let last_turn = ((max_rad - target[i]) / TAU).floor();

            if !(first_turn <= last_turn) {
                warn!(
                    "Joint {} target {:.4} rad cannot be brought within [{:.4}, {:.4}] rad",
                    i + 1,
                    target[i],
                    min_rad,
                    max_rad
                );
                return Err(ArmCtrlError::OutsideLimits {
                    joint: i,
                    pos_rad: target[i],
                });
            }

            let turn = ((self.output[i] - target[i]) / TAU)
                .round()
                .max(first_turn)
                .min(last_turn);

            if turn != 0.0 {
                let fitted = clamp(&(target[i] + turn * TAU), &min_rad, &max_rad);
                debug!(
                    "Joint {} target {:.4} rad moved by {} turns to {:.4} rad",
                    i + 1,
                    target[i],
                    turn,
                    fitted
                );
                target[i] = fitted;
            }
        }

        Ok(target)
    }

    /// Perform the stop command calculations.
    ///
    /// The stop command abandons the current sequence, holding the demands
    /// already latched. Stop never fails.
    fn calc_stop(&mut self) {
        if self.sequence.take().is_some() {
            info!("Arm sequence stopped, holding demands {}", self.output);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arm_kin::{IkError, IkParams, KinematicModel};
    use std::f64::consts::PI;

    fn arm_ctrl(params: Params) -> ArmCtrl {
        let inv_kin = InvKin::new(KinematicModel::reference().unwrap(), IkParams::default()).unwrap();
        ArmCtrl::new(params, inv_kin).unwrap()
    }

    fn run(ctrl: &mut ArmCtrl, cmd: Option<ArmCmd>) -> Vec<(JointAngles, StatusReport)> {
        let mut outputs = vec![ctrl.proc(&InputData { cmd }).unwrap()];
        while ctrl.is_busy() {
            outputs.push(ctrl.proc(&InputData::default()).unwrap());
        }
        outputs
    }

    fn scenario() -> ArmCmd {
        ArmCmd::BasicRotation {
            theta_1_rad: PI / 6.0,
            theta_2_rad: -PI / 3.0,
            theta_3_rad: PI / 6.0,
            theta_4_rad: PI / 3.0,
        }
    }

    #[test]
    fn test_move_stages() {
        let mut ctrl = arm_ctrl(Params::default());
        let outputs = run(&mut ctrl, Some(scenario()));

        assert_eq!(outputs.len(), 50);

        // Each joint changes on its own stage cycle only
        let first_change = |joint: usize| {
            outputs
                .iter()
                .position(|(dems, _)| dems[joint] != 0.0)
                .unwrap()
        };
        assert_eq!(first_change(0), 10);
        assert_eq!(first_change(1), 20);
        assert_eq!(first_change(2), 30);
        assert_eq!(first_change(3), 40);

        assert!(outputs[..49].iter().all(|(_, r)| r.sequence_active));
        assert!(outputs[49].1.sequence_complete);

        assert_eq!(
            *ctrl.demands(),
            JointAngles::new(PI / 6.0, -PI / 3.0, PI / 6.0, PI / 3.0)
        );
    }

    #[test]
    fn test_return_home() {
        let mut ctrl = arm_ctrl(Params::default());
        run(&mut ctrl, Some(scenario()));

        ctrl.return_home();
        let outputs = run(&mut ctrl, None);

        // Wrist first, base last
        assert_eq!(outputs[10].0[3], 0.0);
        assert_eq!(outputs[10].0[0], PI / 6.0);
        assert_eq!(outputs[20].0[2], 0.0);
        assert_eq!(outputs[30].0[1], 0.0);
        assert_eq!(outputs[39].0[0], PI / 6.0);
        assert_eq!(outputs[40].0[0], 0.0);

        assert_eq!(*ctrl.demands(), JointAngles::zero());
        assert!(!ctrl.is_busy());
    }

    #[test]
    fn test_inverse_kinematics_move() {
        let mut ctrl = arm_ctrl(Params::default());
        let model = KinematicModel::reference().unwrap();
        let target =
            model.compute_pose(&JointAngles::new(PI / 6.0, -PI / 3.0, PI / 6.0, PI / 3.0));

        run(
            &mut ctrl,
            Some(ArmCmd::InverseKinematics {
                x_m: target.x_m,
                y_m: target.y_m,
                z_m: target.z_m,
            }),
        );

        let reached = ctrl.demanded_position().unwrap();
        assert!(reached.dist(&target) < 1e-6);

        // The wrist does not move the tip, so it stays at its current demand
        assert!(ctrl.demands()[3].abs() < 1e-6);
    }

    #[test]
    fn test_unreachable_target() {
        let mut ctrl = arm_ctrl(Params::default());

        let result = ctrl.proc(&InputData {
            cmd: Some(ArmCmd::InverseKinematics {
                x_m: 100.0,
                y_m: 0.0,
                z_m: 0.0,
            }),
        });

        assert!(matches!(
            result,
            Err(ArmCtrlError::IkError(IkError::Unreachable { .. }))
        ));
        assert!(!ctrl.is_busy());
        assert_eq!(*ctrl.demands(), JointAngles::zero());
        assert_eq!(ctrl.current_cmd, None);
    }

    #[test]
    fn test_failed_cmd_keeps_current() {
        let mut ctrl = arm_ctrl(Params::default());
        ctrl.proc(&InputData { cmd: Some(scenario()) }).unwrap();

        let result = ctrl.proc(&InputData {
            cmd: Some(ArmCmd::InverseKinematics {
                x_m: 100.0,
                y_m: 0.0,
                z_m: 0.0,
            }),
        });
        assert!(result.is_err());

        // The move in progress carries on
        assert_eq!(ctrl.current_cmd, Some(scenario()));
        assert!(ctrl.is_busy());
        run(&mut ctrl, None);
        assert_eq!(
            *ctrl.demands(),
            JointAngles::new(PI / 6.0, -PI / 3.0, PI / 6.0, PI / 3.0)
        );
    }

    #[test]
    fn test_inverse_kinematics_across_half_turn() {
        let mut ctrl = arm_ctrl(Params::default());
        let model = KinematicModel::reference().unwrap();

        // Base demand just short of the upper limit
        run(
            &mut ctrl,
            Some(ArmCmd::BasicRotation {
                theta_1_rad: 3.0,
                theta_2_rad: 0.0,
                theta_3_rad: 0.0,
                theta_4_rad: 0.0,
            }),
        );

        // Target just past the half turn, nearest the demand at 3.303 rad
        let target = model.compute_pose(&JointAngles::new(-2.98, -0.6, 0.9, 0.0));
        let outputs = run(
            &mut ctrl,
            Some(ArmCmd::InverseKinematics {
                x_m: target.x_m,
                y_m: target.y_m,
                z_m: target.z_m,
            }),
        );

        assert!(outputs.iter().all(|(_, r)| r.abs_pos_limited == [false; NUM_JOINTS]));
        assert!((ctrl.demands()[0] + 2.98).abs() < 1e-6);
        assert!(ctrl.demanded_position().unwrap().dist(&target) < 1e-6);

        for i in 0..NUM_JOINTS {
            assert!(ctrl.demands()[i] <= ctrl.params.max_abs_pos_rad[i]);
            assert!(ctrl.demands()[i] >= ctrl.params.min_abs_pos_rad[i]);
        }
    }

    #[test]
    fn test_inverse_kinematics_outside_limits() {
        let mut params = Params::default();
        params.max_abs_pos_rad[0] = 0.1;
        params.min_abs_pos_rad[0] = -0.1;
        let mut ctrl = arm_ctrl(params);
        let model = KinematicModel::reference().unwrap();

        // Either base branch for this target is well outside the limits
        let target = model.compute_pose(&JointAngles::new(1.5, -0.6, 0.9, 0.0));
        let result = ctrl.proc(&InputData {
            cmd: Some(ArmCmd::InverseKinematics {
                x_m: target.x_m,
                y_m: target.y_m,
                z_m: target.z_m,
            }),
        });

        assert!(matches!(
            result,
            Err(ArmCtrlError::OutsideLimits { joint: 0, .. })
        ));
        assert!(!ctrl.is_busy());
        assert_eq!(*ctrl.demands(), JointAngles::zero());
        assert_eq!(ctrl.current_cmd, None);
    }

    #[test]
    fn test_limits_enforced() {
        let mut params = Params::default();
        params.max_abs_pos_rad[1] = 1.0;
        params.min_abs_pos_rad[2] = -0.5;
        let mut ctrl = arm_ctrl(params);

        let outputs = run(
            &mut ctrl,
            Some(ArmCmd::BasicRotation {
                theta_1_rad: 0.2,
                theta_2_rad: 1.5,
                theta_3_rad: -0.8,
                theta_4_rad: 0.0,
            }),
        );

        assert_eq!(outputs[0].1.abs_pos_limited, [false, true, true, false]);
        assert!(outputs[1..].iter().all(|(_, r)| !r.abs_pos_limited[1]));
        assert_eq!(*ctrl.demands(), JointAngles::new(0.2, 1.0, -0.5, 0.0));
    }

    #[test]
    fn test_stop_holds_demands() {
        let mut ctrl = arm_ctrl(Params::default());
        ctrl.proc(&InputData { cmd: Some(scenario()) }).unwrap();
        for _ in 0..24 {
            ctrl.proc(&InputData::default()).unwrap();
        }

        let (dems, report) = ctrl.proc(&InputData { cmd: Some(ArmCmd::Stop) }).unwrap();
        assert!(!report.sequence_active);
        assert!(!ctrl.is_busy());
        assert_eq!(dems, JointAngles::new(PI / 6.0, -PI / 3.0, 0.0, 0.0));

        let (dems_after, _) = ctrl.proc(&InputData::default()).unwrap();
        assert_eq!(dems_after, dems);
    }

    #[test]
    fn test_make_safe_returns_home() {
        let mut ctrl = arm_ctrl(Params::default());
        ctrl.proc(&InputData { cmd: Some(scenario()) }).unwrap();
        for _ in 0..34 {
            ctrl.proc(&InputData::default()).unwrap();
        }

        ctrl.make_safe();
        assert_eq!(ctrl.current_cmd, Some(ArmCmd::ReturnHome));

        run(&mut ctrl, None);
        assert_eq!(*ctrl.demands(), JointAngles::zero());
    }

    #[test]
    fn test_invalid_cmd() {
        let mut ctrl = arm_ctrl(Params::default());
        let result = ctrl.proc(&InputData {
            cmd: Some(ArmCmd::BasicRotation {
                theta_1_rad: f64::NAN,
                theta_2_rad: 0.0,
                theta_3_rad: 0.0,
                theta_4_rad: 0.0,
            }),
        });
        assert!(matches!(result, Err(ArmCtrlError::InvalidArmCmd(_))));

        let mut uninit = ArmCtrl::default();
        assert!(matches!(
            uninit.proc(&InputData::default()),
            Err(ArmCtrlError::NotInitialised)
        ));
    }
}
