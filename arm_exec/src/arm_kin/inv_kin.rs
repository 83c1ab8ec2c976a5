//! Arm inverse kinematics calculations

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace};
use nalgebra::{Matrix3, Matrix3x4, Vector3, Vector4};
use std::f64::consts::PI;

use util::maths::{lin_map, unwrap_near};

// Internal imports
use super::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Bases of the Halton sequence used to spread the restart seeds, one prime
/// per joint.
const HALTON_BASES: [usize; NUM_JOINTS] = [2, 3, 5, 7];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Inverse kinematics solver.
///
/// Holds the kinematic model together with the solver settings, both are
/// immutable once built so a single solver can be shared between threads.
#[derive(Debug, Clone)]
pub struct InvKin {
    model: KinematicModel,

    params: IkParams,

    /// Seeds tried after the reference configuration, fixed at construction
    /// so that every call is deterministic.
    restart_seeds: Vec<JointAngles>,
}

/// How a single seed's refinement ended.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SeedOutcome {
    /// Position error within tolerance.
    Converged,

    /// The step became negligible while the error is still too large, a
    /// local minimum of the error or a singularity.
    Stalled,

    /// Iteration budget used up.
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
struct SeedResult {
    outcome: SeedOutcome,
    joints: JointAngles,
    residual_m: f64,
    iterations: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl InvKin {
    /// Create a new solver for the given model, validating the settings.
    pub fn new(model: KinematicModel, params: IkParams) -> Result<Self, ConfigError> {
        validate_params(&params)?;

        let restart_seeds = (1..=params.num_restarts)
            .map(|index| {
                let mut seed = JointAngles::zero();
                for (joint, base) in HALTON_BASES.iter().enumerate() {
                    seed[joint] = lin_map((0.0, 1.0), (-PI, PI), radical_inverse(index, *base));
                }
                seed
            })
            .collect();

        Ok(Self {
            model,
            params,
            restart_seeds,
        })
    }

    /// Build the model and the solver from the contents of a parameter file.
    pub fn from_params(params: &Params) -> Result<Self, ConfigError> {
        Self::new(KinematicModel::new(&params.model)?, params.ik.clone())
    }

    pub fn model(&self) -> &KinematicModel {
        &self.model
    }

    pub fn params(&self) -> &IkParams {
        &self.params
    }

    /// The configured reference configuration.
    pub fn reference(&self) -> JointAngles {
        JointAngles {
            pos_rad: self.params.reference_rad,
        }
    }

    /// Compute joint angles which place the end effector at `target`.
    ///
    /// Equivalent to [`Self::compute_joints_from`] with the configured
    /// reference configuration.
    pub fn compute_joints(&self, target: &Position) -> Result<JointAngles, IkError> {
        self.compute_joints_from(target, &self.reference())
    }

    /// Compute joint angles which place the end effector at `target`,
    /// preferring the solution closest to `reference`.
    ///
    /// The solution is refined with damped least squares
    /// (https://en.wikipedia.org/wiki/Levenberg%E2%80%93Marquardt_algorithm)
    /// against the forward kinematics, first from `reference` and then from
    /// each restart seed. Every converged solution is moved by whole turns
    /// onto the angles nearest `reference`, then slid towards `reference`
    /// along the joint motions which leave the end effector in place (for the
    /// reference arm the wrist roll). The one with the smallest sum of
    /// absolute joint differences to `reference` is returned. Equal distances
    /// go to the earlier seed.
    ///
    /// # Errors
    /// - `IkError::Unreachable` if the target is further than the arm's reach
    ///   or no seed gets closer to it than `unreachable_residual_m`.
    /// - `IkError::NotConverged` if seeds got close to the target but none
    ///   reached `tolerance_m` within `max_iterations`.
    pub fn compute_joints_from(
        &self,
        target: &Position,
        reference: &JointAngles,
    ) -> Result<JointAngles, IkError> {
        if !target.is_finite() || !reference.is_finite() {
            return Err(IkError::Unreachable {
                residual_m: std::f64::INFINITY,
            });
        }

        let target_m = target.to_vector();

        // Workspace check
        let dist_m = (target_m - self.model.base_point_m()).norm();
        if dist_m > self.model.reach_m() + self.params.tolerance_m {
            debug!(
                "IK target {} is {:.4} m from the base axis, beyond the {:.4} m reach",
                target,
                dist_m,
                self.model.reach_m()
            );
            return Err(IkError::Unreachable {
                residual_m: dist_m - self.model.reach_m(),
            });
        }

        let mut best: Option<(f64, JointAngles)> = None;
        let mut best_residual_m = std::f64::INFINITY;
        let mut all_stalled = true;
        let mut total_iterations = 0;

        for (seed_index, seed) in std::iter::once(reference)
            .chain(self.restart_seeds.iter())
            .enumerate()
        {
            let result = self.refine(&target_m, seed);
            total_iterations += result.iterations;

            trace!(
                "IK seed {}: {:?} after {} iterations, residual {:.3e} m",
                seed_index,
                result.outcome,
                result.iterations,
                result.residual_m
            );

            match result.outcome {
                SeedOutcome::Converged => {
                    let mut joints = result.joints;
                    for joint in 0..NUM_JOINTS {
                        joints[joint] = unwrap_near(joints[joint], reference[joint]);
                    }
                    let joints = self.settle(&target_m, joints, reference);

                    let dist_rad = joints.l1_dist(reference);
                    let closer = match best {
                        Some((best_dist_rad, _)) => dist_rad < best_dist_rad,
                        None => true,
                    };
                    if closer {
                        best = Some((dist_rad, joints));
                    }
                }
                outcome => {
                    best_residual_m = best_residual_m.min(result.residual_m);
                    all_stalled &= outcome == SeedOutcome::Stalled;
                }
            }
        }

        match best {
            Some((dist_rad, joints)) => {
                debug!(
                    "IK solution for {}: {} ({:.4} rad from reference, {} iterations)",
                    target, joints, dist_rad, total_iterations
                );
                Ok(joints)
            }
            None if best_residual_m > self.params.unreachable_residual_m || all_stalled => {
                debug!(
                    "IK target {} unreachable, closest approach {:.3e} m",
                    target, best_residual_m
                );
                Err(IkError::Unreachable {
                    residual_m: best_residual_m,
                })
            }
            None => Err(IkError::NotConverged {
                iterations: total_iterations,
                residual_m: best_residual_m,
            }),
        }
    }

    /// Slide a converged solution towards `reference` without leaving the
    /// target.
    ///
    /// Each step moves along the null space of the position Jacobian by the
    /// component of `reference - joints` lying in it, then refines back onto
    /// the target. Stops once a step no longer brings the solution closer.
    fn settle(
        &self,
        target_m: &Vector3<f64>,
        joints: JointAngles,
        reference: &JointAngles,
    ) -> JointAngles {
        let mut settled = joints;

        for _ in 0..self.params.max_iterations {
            let null_dir = match null_space_direction(&self.model.position_jacobian(&settled)) {
                Some(n) => n,
                None => break,
            };

            let pull_rad = reference.to_vector() - settled.to_vector();
            let mut step_rad = null_dir * null_dir.dot(&pull_rad);
            let step_norm_rad = step_rad.norm();

            if !step_norm_rad.is_finite() || step_norm_rad < self.params.stall_step_rad {
                break;
            }
            if step_norm_rad > self.params.max_step_rad {
                step_rad *= self.params.max_step_rad / step_norm_rad;
            }

            let moved = JointAngles::from_vector(&(settled.to_vector() + step_rad));
            let result = self.refine(target_m, &moved);

            if result.outcome != SeedOutcome::Converged
                || result.joints.l1_dist(reference) >= settled.l1_dist(reference)
            {
                break;
            }
            settled = result.joints;
        }

        settled
    }

    /// Refine a single seed towards the target.
    fn refine(&self, target_m: &Vector3<f64>, seed: &JointAngles) -> SeedResult {
        let damping_sq = self.params.damping * self.params.damping;
        let mut joints = *seed;

        for iteration in 0..self.params.max_iterations {
            let error_m = target_m - self.model.compute_pose(&joints).to_vector();
            let residual_m = error_m.norm();

            if residual_m <= self.params.tolerance_m {
                return SeedResult {
                    outcome: SeedOutcome::Converged,
                    joints,
                    residual_m,
                    iterations: iteration,
                };
            }

            let stalled = SeedResult {
                outcome: SeedOutcome::Stalled,
                joints,
                residual_m,
                iterations: iteration,
            };

            // dq = J^T (J J^T + lambda^2 I)^-1 e
            let jacobian = self.model.position_jacobian(&joints);
            let damped = jacobian * jacobian.transpose() + Matrix3::identity() * damping_sq;
            let damped_inv = match damped.try_inverse() {
                Some(i) => i,
                None => return stalled,
            };

            let mut step_rad = jacobian.transpose() * (damped_inv * error_m);
            let step_norm_rad = step_rad.norm();

            if !step_norm_rad.is_finite() || step_norm_rad < self.params.stall_step_rad {
                return stalled;
            }
            if step_norm_rad > self.params.max_step_rad {
                step_rad *= self.params.max_step_rad / step_norm_rad;
            }

            joints = JointAngles::from_vector(&(joints.to_vector() + step_rad));
        }

        let residual_m = (target_m - self.model.compute_pose(&joints).to_vector()).norm();

        SeedResult {
            outcome: if residual_m <= self.params.tolerance_m {
                SeedOutcome::Converged
            } else {
                SeedOutcome::Exhausted
            },
            joints,
            residual_m,
            iterations: self.params.max_iterations,
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn validate_params(params: &IkParams) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::InvalidIkParams(String::from(msg)));

    if !(params.tolerance_m.is_finite() && params.tolerance_m > 0.0) {
        return invalid("tolerance_m must be positive");
    }
    if params.max_iterations == 0 {
        return invalid("max_iterations must be at least 1");
    }
    if !(params.damping.is_finite() && params.damping >= 0.0) {
        return invalid("damping must not be negative");
    }
    if !(params.max_step_rad.is_finite() && params.max_step_rad > 0.0) {
        return invalid("max_step_rad must be positive");
    }
    if !(params.stall_step_rad.is_finite() && params.stall_step_rad >= 0.0) {
        return invalid("stall_step_rad must not be negative");
    }
    if !(params.unreachable_residual_m.is_finite()
        && params.unreachable_residual_m >= params.tolerance_m)
    {
        return invalid("unreachable_residual_m must be at least tolerance_m");
    }
    if !params.reference_rad.iter().all(|r| r.is_finite()) {
        return Err(ConfigError::NonFinite(String::from("reference_rad")));
    }

    Ok(())
}

/// Unit vector spanning the null space of a full rank position Jacobian.
///
/// Built from the signed 3x3 minors, so `jacobian * n` is the determinant of
/// the Jacobian with a repeated row, i.e. zero. Returns `None` at a
/// singularity, where the minors all vanish and the null space is larger.
fn null_space_direction(jacobian: &Matrix3x4<f64>) -> Option<Vector4<f64>> {
    let minor = |skip: usize| {
        let mut cols = [Vector3::zeros(); NUM_JOINTS - 1];
        for (col, joint) in (0..NUM_JOINTS).filter(|j| *j != skip).enumerate() {
            cols[col] = jacobian.column(joint).into_owned();
        }
        Matrix3::from_columns(&cols).determinant()
    };

    let null = Vector4::new(minor(0), -minor(1), minor(2), -minor(3));

    if null.norm() > std::f64::EPSILON * jacobian.norm().powi(3) {
        Some(null.normalize())
    } else {
        None
    }
}

/// Radical inverse of `index` in the given base, the `index`th element of the
/// van der Corput sequence, in `[0, 1)`.
fn radical_inverse(mut index: usize, base: usize) -> f64 {
    let inv_base = 1.0 / base as f64;
    let mut factor = 1.0;
    let mut value = 0.0;

    while index > 0 {
        factor *= inv_base;
        value += factor * (index % base) as f64;
        index /= base;
    }

    value
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::{FRAC_PI_3, FRAC_PI_6, TAU};
    use std::sync::Arc;
    use std::thread;

    /// Round trip tolerance on the recovered position.
    const EPS_M: f64 = 1e-6;

    fn solver() -> InvKin {
        InvKin::new(KinematicModel::reference().unwrap(), IkParams::default()).unwrap()
    }

    fn scenario() -> JointAngles {
        JointAngles::new(FRAC_PI_6, -FRAC_PI_3, FRAC_PI_6, FRAC_PI_3)
    }

    /// Arm with the base axis through the origin and three parallel pitch
    /// axes, links of 0.2 m and 0.15 m and the wrist at the tool point.
    fn planar_model() -> KinematicModel {
        let yaw = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0]];
        let pitch = [[0.0, 0.0, 1.0], [0.0, 0.0, 0.0], [-1.0, 0.0, 0.0]];

        KinematicModel::new(&ModelParams {
            screw_axes: vec![
                ScrewAxisParams { rot: yaw, lin_m: [0.0, 0.0, 0.0] },
                ScrewAxisParams { rot: pitch, lin_m: [-0.1, 0.0, 0.0] },
                ScrewAxisParams { rot: pitch, lin_m: [-0.1, 0.0, 0.2] },
                ScrewAxisParams { rot: pitch, lin_m: [-0.1, 0.0, 0.35] },
            ],
            home_transform: [
                [1.0, 0.0, 0.0, 0.35],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.1],
                [0.0, 0.0, 0.0, 1.0],
            ],
        })
        .unwrap()
    }

    #[test]
    fn test_scenario_round_trip() {
        let ik = solver();
        let target = ik.model().compute_pose(&scenario());

        let joints = ik.compute_joints(&target).unwrap();
        assert!(ik.model().compute_pose(&joints).dist(&target) < EPS_M);

        // Repeat calls give the same answer
        assert_eq!(ik.compute_joints(&target).unwrap(), joints);

        // From its own configuration the solver stays put
        let joints = ik.compute_joints_from(&target, &scenario()).unwrap();
        assert!(joints.l1_dist(&scenario()) < 1e-9);
    }

    #[test]
    fn test_round_trip_sample() {
        let ik = solver();

        for theta_1 in &[-1.5, 0.0, 1.5] {
            for theta_2 in &[-1.0, 0.0, 0.8] {
                for theta_3 in &[-0.8, 0.3, 1.2] {
                    let joints = JointAngles::new(*theta_1, *theta_2, *theta_3, 0.5);
                    let target = ik.model().compute_pose(&joints);

                    let solved = ik.compute_joints(&target).unwrap();
                    let dist_m = ik.model().compute_pose(&solved).dist(&target);
                    assert!(dist_m < EPS_M, "{} -> {}: {} m", joints, solved, dist_m);
                }
            }
        }
    }

    #[test]
    fn test_home_round_trip() {
        let ik = solver();
        let joints = ik.compute_joints(&ik.model().home_position()).unwrap();

        // The reference is itself a solution
        assert_eq!(joints, JointAngles::zero());
    }

    #[test]
    fn test_unreachable() {
        let ik = solver();

        // Far outside the reach
        match ik.compute_joints(&Position::new(100.0, 0.0, 0.0)) {
            Err(IkError::Unreachable { residual_m }) => assert!(residual_m > 99.0),
            r => panic!("Expected unreachable, got {:?}", r),
        }

        // Within the reach but on the base axis, which is offset from the
        // plane the rest of the arm moves in
        match ik.compute_joints(&Position::new(0.0, 0.012, 0.2)) {
            Err(IkError::Unreachable { residual_m }) => assert!(residual_m > 0.01),
            r => panic!("Expected unreachable, got {:?}", r),
        }

        assert!(matches!(
            ik.compute_joints(&Position::new(std::f64::NAN, 0.0, 0.0)),
            Err(IkError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_not_converged() {
        let params = IkParams {
            max_iterations: 1,
            num_restarts: 0,
            ..IkParams::default()
        };
        let ik = InvKin::new(KinematicModel::reference().unwrap(), params).unwrap();
        let target = ik.model().compute_pose(&JointAngles::new(0.01, 0.01, 0.01, 0.0));

        match ik.compute_joints(&target) {
            Err(IkError::NotConverged { iterations, residual_m }) => {
                assert_eq!(iterations, 1);
                assert!(residual_m > ik.params().tolerance_m);
                assert!(residual_m < ik.params().unreachable_residual_m);
            }
            r => panic!("Expected not converged, got {:?}", r),
        }
    }

    #[test]
    fn test_elbow_tie_break() {
        let ik = InvKin::new(planar_model(), IkParams::default()).unwrap();

        let elbow_down = JointAngles::new(0.3, 0.4, 0.8, 0.0);
        let target = ik.model().compute_pose(&elbow_down);

        // Mirror the elbow about the line from the shoulder to the target
        let horizontal_m = target.x_m.hypot(target.y_m);
        let phi = (target.z_m - 0.1).atan2(horizontal_m);
        let elbow_up = JointAngles::new(0.3, -0.4 - 2.0 * phi, -0.8, 0.0);
        assert!(ik.model().compute_pose(&elbow_up).dist(&target) < 1e-12);

        let cases = [
            (JointAngles::new(0.4, 0.3, 0.9, 0.05), elbow_down),
            (JointAngles::new(0.2, 1.2, -0.7, 0.05), elbow_up),
            (JointAngles::new(0.3, 0.7, 0.0, 0.0), elbow_down),
        ];

        for (reference, expected) in cases.iter() {
            let joints = ik.compute_joints_from(&target, reference).unwrap();

            for joint in 0..3 {
                assert!(
                    (joints[joint] - expected[joint]).abs() < 1e-6,
                    "reference {}: got {}, expected {}",
                    reference,
                    joints,
                    expected
                );
            }

            // The wrist doesn't move the tool so it stays at the reference
            assert!((joints[3] - reference[3]).abs() < 1e-9);

            // Never further from the reference than either known solution
            let best_known = elbow_down.l1_dist(reference).min(elbow_up.l1_dist(reference));
            assert!(joints.l1_dist(reference) <= best_known + reference[3].abs() + 1e-6);
        }
    }

    #[test]
    fn test_null_space_direction() {
        let model = KinematicModel::reference().unwrap();
        let jacobian = model.position_jacobian(&scenario());

        // The wrist roll axis passes through the tool point
        let null = null_space_direction(&jacobian).unwrap();
        assert!((null.norm() - 1.0).abs() < 1e-12);
        assert!((jacobian * null).norm() < 1e-12);
        assert!((null[3].abs() - 1.0).abs() < 1e-9);

        assert!(null_space_direction(&Matrix3x4::zeros()).is_none());
    }

    #[test]
    fn test_wrist_follows_reference() {
        let ik = solver();
        let known = JointAngles::new(0.4, -0.6, 0.9, 0.0);
        let target = ik.model().compute_pose(&known);

        let grid = [-3.0, -1.5, 0.0, 1.5, 3.0];

        for r_1 in grid.iter() {
            for r_2 in grid.iter() {
                for r_3 in grid.iter() {
                    for r_4 in &[0.0, -2.5, 2.0] {
                        let reference = JointAngles::new(*r_1, *r_2, *r_3, *r_4);
                        let joints = ik.compute_joints_from(&target, &reference).unwrap();

                        assert!(ik.model().compute_pose(&joints).dist(&target) < EPS_M);

                        // The wrist roll doesn't move the tool
                        assert!(
                            (joints[3] - reference[3]).abs() < 1e-9,
                            "reference {}: got {}",
                            reference,
                            joints
                        );

                        // No further than the known solution taken near the reference
                        let mut near_known = known;
                        for joint in 0..3 {
                            near_known[joint] = unwrap_near(known[joint], reference[joint]);
                        }
                        near_known[3] = reference[3];
                        assert!(
                            joints.l1_dist(&reference) <= near_known.l1_dist(&reference) + 1e-6,
                            "reference {}: got {}, {} is closer",
                            reference,
                            joints,
                            near_known
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_solution_unwrapped_near_reference() {
        let ik = InvKin::new(planar_model(), IkParams::default()).unwrap();
        let joints = JointAngles::new(0.3, 0.4, 0.8, 0.0);
        let target = ik.model().compute_pose(&joints);

        let reference = JointAngles::new(0.3 + TAU, 0.4, 0.8 - TAU, 0.0);
        let solved = ik.compute_joints_from(&target, &reference).unwrap();

        assert!((solved[0] - (0.3 + TAU)).abs() < 1e-6);
        assert!((solved[1] - 0.4).abs() < 1e-6);
        assert!((solved[2] - (0.8 - TAU)).abs() < 1e-6);
    }

    #[test]
    fn test_concurrent_use() {
        let ik = Arc::new(solver());
        let target = ik.model().compute_pose(&scenario());
        let expected = ik.compute_joints(&target).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ik = Arc::clone(&ik);
                thread::spawn(move || ik.compute_joints(&target))
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap().unwrap(), expected);
        }
    }

    #[test]
    fn test_invalid_params() {
        let model = KinematicModel::reference().unwrap();
        let bad = [
            IkParams { tolerance_m: 0.0, ..IkParams::default() },
            IkParams { max_iterations: 0, ..IkParams::default() },
            IkParams { damping: -1.0, ..IkParams::default() },
            IkParams { max_step_rad: std::f64::NAN, ..IkParams::default() },
            IkParams { unreachable_residual_m: 1e-12, ..IkParams::default() },
        ];

        for params in bad.iter() {
            assert!(matches!(
                InvKin::new(model.clone(), params.clone()),
                Err(ConfigError::InvalidIkParams(_))
            ));
        }

        let params = IkParams {
            reference_rad: [0.0, std::f64::INFINITY, 0.0, 0.0],
            ..IkParams::default()
        };
        assert!(matches!(InvKin::new(model, params), Err(ConfigError::NonFinite(_))));
    }

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse(0, 2), 0.0);
        assert_eq!(radical_inverse(1, 2), 0.5);
        assert_eq!(radical_inverse(2, 2), 0.25);
        assert_eq!(radical_inverse(3, 2), 0.75);
        assert!((radical_inverse(1, 3) - 1.0 / 3.0).abs() < 1e-15);
        assert!((radical_inverse(4, 3) - 4.0 / 9.0).abs() < 1e-15);
    }
}
