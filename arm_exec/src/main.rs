//! Main arm executable entry point.
//!
//! # Architecture
//!
//! The executable runs one of the following, selected on the command line:
//!
//!     - `fk`: forward kinematics of a set of joint angles
//!     - `ik`: inverse kinematics of a target position
//!     - `arm`: an arm command run through arm control in the cyclic loop,
//!       followed by a return to home
//!     - `demo` (default): a round trip through the reference arm
//!
//! Each run creates a session holding the log and a JSON report of the
//! results.
//!
//! # Modules
//!
//! All modules (e.g. `arm_ctrl`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use arm_lib::{
    arm_ctrl::{ArmCmd, ArmCtrl, ArmCtrlError, InputData, StatusReport},
    arm_kin::{self, IkError, InvKin, JointAngles, Position},
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::f64::consts::PI;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module::{SafeMode, State},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.10;

// ---------------------------------------------------------------------------
// COMMAND LINE
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "arm_exec", about = "Kinematics and control of the 4 axis arm")]
struct Opt {
    /// Minimum level of messages to log, one of info, debug or trace.
    #[structopt(short, long, default_value = "debug")]
    log_level: LevelFilter,

    #[structopt(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Compute the end effector position for the given joint angles.
    #[structopt(name = "fk")]
    Fk {
        #[structopt(allow_hyphen_values = true)]
        theta_1_rad: f64,
        #[structopt(allow_hyphen_values = true)]
        theta_2_rad: f64,
        #[structopt(allow_hyphen_values = true)]
        theta_3_rad: f64,
        #[structopt(allow_hyphen_values = true)]
        theta_4_rad: f64,
    },

    /// Compute the joint angles placing the end effector at the given
    /// position.
    #[structopt(name = "ik")]
    Ik {
        #[structopt(allow_hyphen_values = true)]
        x_m: f64,
        #[structopt(allow_hyphen_values = true)]
        y_m: f64,
        #[structopt(allow_hyphen_values = true)]
        z_m: f64,
    },

    /// Execute an arm command, then return the arm home.
    #[structopt(name = "arm")]
    Arm(ArmCmd),

    /// Round trip the reference joint angles through forward and inverse
    /// kinematics.
    #[structopt(name = "demo")]
    Demo,
}

// ---------------------------------------------------------------------------
// REPORTS
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct FkReport {
    joints: JointAngles,
    position: Position,
}

#[derive(Serialize)]
struct IkReport {
    target: Position,
    joints: Option<JointAngles>,
    achieved: Option<Position>,
    error: Option<IkError>,
}

/// Arm control output on one cycle.
#[derive(Serialize)]
struct CycleRecord {
    cycle: u64,
    dems: JointAngles,
    report: StatusReport,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(opt.log_level, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Arm Executable\n");
    info!("Running on: {}", host::get_platform());
    info!("Session directory: {:?}\n", session.session_root);

    debug!("CLI arguments: {:?}", opt);

    // ---- LOAD PARAMETERS ----

    let kin_params: arm_kin::Params =
        util::params::load("arm_kin.toml").wrap_err("Could not load arm kinematics params")?;

    let inv_kin = InvKin::from_params(&kin_params).wrap_err("Invalid arm kinematics params")?;

    info!("Exec parameters loaded");

    // ---- RUN ----

    match opt.cmd.unwrap_or(Command::Demo) {
        Command::Fk {
            theta_1_rad,
            theta_2_rad,
            theta_3_rad,
            theta_4_rad,
        } => run_fk(
            &inv_kin,
            JointAngles::new(theta_1_rad, theta_2_rad, theta_3_rad, theta_4_rad),
            &session,
        ),
        Command::Ik { x_m, y_m, z_m } => run_ik(&inv_kin, Position::new(x_m, y_m, z_m), &session),
        Command::Arm(cmd) => run_arm(cmd, &session),
        Command::Demo => run_demo(&inv_kin, &session),
    }?;

    // ---- SHUTDOWN ----

    info!("End of execution");

    Ok(())
}

fn run_fk(inv_kin: &InvKin, joints: JointAngles, session: &Session) -> Result<(), Report> {
    let position = inv_kin.model().compute_pose(&joints);

    info!("Joint angles {} give end effector position {}", joints, position);

    session
        .save_json("fk.json", &FkReport { joints, position })
        .wrap_err("Failed to save the FK report")
}

fn run_ik(inv_kin: &InvKin, target: Position, session: &Session) -> Result<(), Report> {
    let result = inv_kin.compute_joints(&target);

    let report = match result {
        Ok(joints) => IkReport {
            target,
            joints: Some(joints),
            achieved: Some(inv_kin.model().compute_pose(&joints)),
            error: None,
        },
        Err(e) => IkReport {
            target,
            joints: None,
            achieved: None,
            error: Some(e),
        },
    };

    session
        .save_json("ik.json", &report)
        .wrap_err("Failed to save the IK report")?;

    let joints = result.wrap_err_with(|| format!("Cannot solve for target {}", target))?;

    info!("Target {} reached at joint angles {}", target, joints);

    Ok(())
}

fn run_demo(inv_kin: &InvKin, session: &Session) -> Result<(), Report> {
    let joints = JointAngles::new(PI / 6.0, -PI / 3.0, PI / 6.0, PI / 3.0);

    let position = inv_kin.model().compute_pose(&joints);
    info!("Forward: {} -> {}", joints, position);

    let solved = inv_kin
        .compute_joints(&position)
        .wrap_err("Reference round trip failed")?;
    let achieved = inv_kin.model().compute_pose(&solved);

    info!("Inverse: {} -> {}", position, solved);
    info!("Round trip error: {:.3e} m", achieved.dist(&position));

    // A target the arm cannot reach is reported, not solved
    let beyond = Position::new(1.0, 0.0, 0.0);
    match inv_kin.compute_joints(&beyond) {
        Ok(j) => warn!("Target {} unexpectedly solved at {}", beyond, j),
        Err(e) => info!("Target {}: {}", beyond, e),
    }

    session
        .save_json(
            "demo.json",
            &IkReport {
                target: position,
                joints: Some(solved),
                achieved: Some(achieved),
                error: None,
            },
        )
        .wrap_err("Failed to save the demo report")
}

/// Run `cmd` through arm control in the cyclic loop, then return home.
fn run_arm(cmd: ArmCmd, session: &Session) -> Result<(), Report> {
    // ---- INITIALISE MODULES ----

    let mut arm_ctrl = ArmCtrl::default();
    arm_ctrl
        .init("arm_ctrl.toml", session)
        .wrap_err("Failed to initialise ArmCtrl")?;
    info!("ArmCtrl init complete");

    // ---- MAIN LOOP ----

    let mut returning_home = matches!(cmd, ArmCmd::ReturnHome);
    let mut pending_cmd = Some(cmd);
    let mut proc_error: Option<ArmCtrlError> = None;
    let mut history = Vec::new();
    let mut num_cycles: u64 = 0;

    info!("Begining main loop\n");

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- ARM CONTROL ----

        match arm_ctrl.proc(&InputData {
            cmd: pending_cmd.take(),
        }) {
            Ok((dems, report)) => {
                if report.sequence_complete {
                    if let Some(p) = arm_ctrl.demanded_position() {
                        info!("Demanded end effector position {}", p);
                    }
                }
                history.push(CycleRecord {
                    cycle: num_cycles,
                    dems,
                    report,
                });
            }
            Err(e) => {
                error!("Error during ArmCtrl processing: {}", e);
                arm_ctrl.make_safe();
                returning_home = true;
                proc_error = Some(e);
            }
        }

        // Once the command is complete go home, once home stop
        if !arm_ctrl.is_busy() {
            if returning_home {
                break;
            }
            info!("Returning arm to home");
            arm_ctrl.return_home();
            returning_home = true;
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
            ),
        }

        num_cycles += 1;
    }

    info!("Arm home after {} cycles", num_cycles);

    session
        .save_json("arm_ctrl.json", &history)
        .wrap_err("Failed to save the ArmCtrl history")?;

    match proc_error {
        Some(e) => Err(e).wrap_err("Arm command failed"),
        None => Ok(()),
    }
}
