//! Kinematic model of the arm

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::{Matrix3, Matrix4, Vector3};

// Internal
use super::{ConfigError, ModelParams, Position, ScrewAxisParams, NUM_JOINTS};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Maximum deviation of `S + S^T` from zero for a skew-symmetric block.
const SKEW_TOLERANCE: f64 = 1e-9;

/// Maximum deviation of a rotation axis norm from one.
const UNIT_AXIS_TOLERANCE: f64 = 1e-6;

/// Maximum pitch (`w . v`) of a revolute screw axis.
const PITCH_TOLERANCE: f64 = 1e-9;

/// Maximum deviation of `R^T R` from identity, and of the bottom row from
/// `[0 0 0 1]`, for the home transform.
const HOME_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Screw axis of one revolute joint, expressed in the base frame at the home
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrewAxis {
    /// Skew-symmetric matrix `[w]` of the unit rotation axis.
    pub rot: Matrix3<f64>,

    /// The unit rotation axis `w`.
    pub axis: Vector3<f64>,

    /// Linear part `v` of the screw axis.
    ///
    /// Units: meters
    pub lin_m: Vector3<f64>,
}

/// Immutable description of the arm's geometry.
///
/// Built once from validated calibration constants, after which it is only
/// ever read.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicModel {
    screw_axes: [ScrewAxis; NUM_JOINTS],

    home: Matrix4<f64>,

    /// Point on each joint axis closest to the base frame origin.
    axis_points_m: [Vector3<f64>; NUM_JOINTS],

    /// Upper bound on the distance between the end effector and the first
    /// joint axis point.
    reach_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScrewAxis {
    /// Build a screw axis from its parameters, validating its shape.
    ///
    /// `index` is the zero based joint index, used in error reporting.
    fn from_params(index: usize, params: &ScrewAxisParams) -> Result<Self, ConfigError> {
        let finite = params.rot.iter().flatten().all(|v| v.is_finite())
            && params.lin_m.iter().all(|v| v.is_finite());
        if !finite {
            return Err(ConfigError::NonFinite(format!("screw_axes[{}]", index)));
        }

        let rot = Matrix3::from_fn(|r, c| params.rot[r][c]);
        let lin_m = Vector3::from(params.lin_m);

        if (rot + rot.transpose()).amax() > SKEW_TOLERANCE {
            return Err(ConfigError::NotSkewSymmetric(index));
        }

        let axis = Vector3::new(rot[(2, 1)], rot[(0, 2)], rot[(1, 0)]);
        let axis_norm = axis.norm();
        if (axis_norm - 1.0).abs() > UNIT_AXIS_TOLERANCE {
            return Err(ConfigError::DegenerateAxis(index, axis_norm));
        }

        let pitch = axis.dot(&lin_m);
        if pitch.abs() > PITCH_TOLERANCE {
            return Err(ConfigError::NotRevolute(index, pitch));
        }

        Ok(Self { rot, axis, lin_m })
    }

    /// The point on this axis closest to the base frame origin.
    pub fn point_m(&self) -> Vector3<f64> {
        self.axis.cross(&self.lin_m)
    }
}

impl KinematicModel {
    /// Build and validate a model from its calibration constants.
    pub fn new(params: &ModelParams) -> Result<Self, ConfigError> {
        if params.screw_axes.len() != NUM_JOINTS {
            return Err(ConfigError::WrongNumAxes(params.screw_axes.len()));
        }

        let mut screw_axes = [ScrewAxis {
            rot: Matrix3::zeros(),
            axis: Vector3::zeros(),
            lin_m: Vector3::zeros(),
        }; NUM_JOINTS];
        for (i, axis_params) in params.screw_axes.iter().enumerate() {
            screw_axes[i] = ScrewAxis::from_params(i, axis_params)?;
        }

        let home = validate_home_transform(&params.home_transform)?;

        // Distances between consecutive axis points are fixed by the joint
        // between them, so their sum bounds the reach.
        let mut axis_points_m = [Vector3::zeros(); NUM_JOINTS];
        for (i, axis) in screw_axes.iter().enumerate() {
            axis_points_m[i] = axis.point_m();
        }
        let tool_point_m = Vector3::new(home[(0, 3)], home[(1, 3)], home[(2, 3)]);
        let reach_m = axis_points_m
            .windows(2)
            .map(|w| (w[1] - w[0]).norm())
            .sum::<f64>()
            + (tool_point_m - axis_points_m[NUM_JOINTS - 1]).norm();

        debug!("Kinematic model built, reach {:.4} m", reach_m);

        Ok(Self {
            screw_axes,
            home,
            axis_points_m,
            reach_m,
        })
    }

    /// The model of the reference arm, see [`ModelParams::reference`].
    pub fn reference() -> Result<Self, ConfigError> {
        Self::new(&ModelParams::reference())
    }

    /// Screw axis of the given zero based joint index.
    ///
    /// # Panics
    /// - If `joint >= NUM_JOINTS`.
    pub fn screw_axis(&self, joint: usize) -> &ScrewAxis {
        &self.screw_axes[joint]
    }

    pub fn screw_axes(&self) -> &[ScrewAxis; NUM_JOINTS] {
        &self.screw_axes
    }

    /// The home transform `M`.
    pub fn home_transform(&self) -> &Matrix4<f64> {
        &self.home
    }

    /// Translation component of the home transform.
    pub fn home_position(&self) -> Position {
        Position::new(self.home[(0, 3)], self.home[(1, 3)], self.home[(2, 3)])
    }

    /// The point on the base joint axis that the reach is measured from.
    pub fn base_point_m(&self) -> Vector3<f64> {
        self.axis_points_m[0]
    }

    /// Maximum distance from [`Self::base_point_m`] at which the end effector
    /// can be placed.
    ///
    /// Units: meters
    pub fn reach_m(&self) -> f64 {
        self.reach_m
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Check that the given row-major matrix is a homogeneous transform with a
/// proper rotation block.
fn validate_home_transform(rows: &[[f64; 4]; 4]) -> Result<Matrix4<f64>, ConfigError> {
    if !rows.iter().flatten().all(|v| v.is_finite()) {
        return Err(ConfigError::NonFinite(String::from("home_transform")));
    }

    let home = Matrix4::from_fn(|r, c| rows[r][c]);

    let bottom_ok = home[(3, 0)].abs() < HOME_TOLERANCE
        && home[(3, 1)].abs() < HOME_TOLERANCE
        && home[(3, 2)].abs() < HOME_TOLERANCE
        && (home[(3, 3)] - 1.0).abs() < HOME_TOLERANCE;
    if !bottom_ok {
        return Err(ConfigError::InvalidHomeTransform(String::from(
            "bottom row must be [0, 0, 0, 1]",
        )));
    }

    let rot = Matrix3::from_fn(|r, c| home[(r, c)]);
    if (rot.transpose() * rot - Matrix3::identity()).amax() > HOME_TOLERANCE {
        return Err(ConfigError::InvalidHomeTransform(String::from(
            "rotation block is not orthonormal",
        )));
    }
    if rot.determinant() < 0.0 {
        return Err(ConfigError::InvalidHomeTransform(String::from(
            "rotation block is a reflection",
        )));
    }

    Ok(home)
}
