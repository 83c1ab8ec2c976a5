//! Arm forward kinematics calculations

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3, Vector4};

// Internal imports
use super::*;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl KinematicModel {
    /// Compute the position of the end effector for the given joint angles.
    ///
    /// Forward kinematics uses the product of exponentials formulation
    /// (https://en.wikipedia.org/wiki/Screw_theory), the pose of the end
    /// effector is
    ///
    /// ```text
    /// T = exp([S1] t1) exp([S2] t2) exp([S3] t3) exp([S4] t4) M
    /// ```
    ///
    /// and the position is `T` applied to the origin. Any finite angles are
    /// accepted, no limits are applied.
    pub fn compute_pose(&self, joints: &JointAngles) -> Position {
        let origin = Vector4::new(0.0, 0.0, 0.0, 1.0);
        let p = self.compute_transform(joints) * origin;

        Position::new(p[0], p[1], p[2])
    }

    /// Compute the full homogeneous transform of the end effector in the base
    /// frame.
    pub fn compute_transform(&self, joints: &JointAngles) -> Matrix4<f64> {
        let mut t = Matrix4::identity();

        for (joint, theta) in joints.pos_rad.iter().enumerate() {
            t *= self.joint_transform(joint, *theta);
        }

        t * self.home_transform()
    }

    /// Compute the derivative of the end effector position with respect to
    /// each joint angle.
    ///
    /// Column `i` is the velocity of the end effector point when joint `i`
    /// moves at 1 rad/s, i.e. `w'_i x p + v'_i` where `(w'_i, v'_i)` is the
    /// screw axis of joint `i` moved by the joints before it.
    ///
    /// Units: meters/radian
    pub fn position_jacobian(&self, joints: &JointAngles) -> Matrix3x4<f64> {
        let mut twists = [(Vector3::zeros(), Vector3::zeros()); NUM_JOINTS];
        let mut t = Matrix4::identity();

        for (joint, theta) in joints.pos_rad.iter().enumerate() {
            let screw = self.screw_axis(joint);
            let (rot, trans) = split_transform(&t);

            // Adjoint map of the transform of all previous joints
            let axis = rot * screw.axis;
            let lin = rot * screw.lin_m + trans.cross(&axis);
            twists[joint] = (axis, lin);

            t *= self.joint_transform(joint, *theta);
        }

        let (_, tip_m) = split_transform(&(t * self.home_transform()));

        let mut jacobian = Matrix3x4::zeros();
        for (joint, (axis, lin)) in twists.iter().enumerate() {
            jacobian.set_column(joint, &(axis.cross(&tip_m) + lin));
        }

        jacobian
    }

    /// Matrix exponential of the given joint's screw axis scaled by `theta`.
    ///
    /// The rotation block uses Rodrigues' formula
    /// `R = I + sin(t) [w] + (1 - cos(t)) [w]^2`, the translation is
    /// `(I t + (1 - cos(t)) [w] + (t - sin(t)) [w]^2) v`.
    pub fn joint_transform(&self, joint: usize, theta: f64) -> Matrix4<f64> {
        let screw = self.screw_axis(joint);
        let s = &screw.rot;
        let s_sq = s * s;
        let (sin_t, cos_t) = theta.sin_cos();

        let rot = Matrix3::identity() + s * sin_t + s_sq * (1.0 - cos_t);
        let trans = (Matrix3::identity() * theta + s * (1.0 - cos_t) + s_sq * (theta - sin_t))
            * screw.lin_m;

        to_homogeneous(&rot, &trans)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Build a homogeneous transform from a rotation and a translation.
fn to_homogeneous(rot: &Matrix3<f64>, trans: &Vector3<f64>) -> Matrix4<f64> {
    let mut t = Matrix4::identity();

    for r in 0..3 {
        for c in 0..3 {
            t[(r, c)] = rot[(r, c)];
        }
        t[(r, 3)] = trans[r];
    }

    t
}

/// Split a homogeneous transform into its rotation and translation.
fn split_transform(t: &Matrix4<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    (
        Matrix3::from_fn(|r, c| t[(r, c)]),
        Vector3::new(t[(0, 3)], t[(1, 3)], t[(2, 3)]),
    )
}
