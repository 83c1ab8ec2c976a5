//! # Arm Kinematics Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::f64::consts::PI;

use arm_lib::arm_kin::{IkParams, InvKin, JointAngles, KinematicModel, Position};

fn fwd_kin_benchmark(c: &mut Criterion) {
    let model = KinematicModel::reference().unwrap();
    let joints = JointAngles::new(PI / 6.0, -PI / 3.0, PI / 6.0, PI / 3.0);

    c.bench_function("compute_pose", |b| {
        b.iter(|| model.compute_pose(black_box(&joints)))
    });

    c.bench_function("position_jacobian", |b| {
        b.iter(|| model.position_jacobian(black_box(&joints)))
    });
}

fn inv_kin_benchmark(c: &mut Criterion) {
    let inv_kin = InvKin::new(KinematicModel::reference().unwrap(), IkParams::default()).unwrap();

    // Reached from the zero reference without restarts
    let near_target = inv_kin
        .model()
        .compute_pose(&JointAngles::new(PI / 6.0, -PI / 3.0, PI / 6.0, PI / 3.0));

    // Outside the reach of the arm, rejected before iterating
    let far_target = Position::new(1.0, 0.0, 0.0);

    // Within reach but off the arm plane, every seed is tried
    let off_plane_target = Position::new(0.0, 0.012, 0.2);

    c.bench_function("compute_joints", |b| {
        b.iter(|| inv_kin.compute_joints(black_box(&near_target)))
    });

    c.bench_function("compute_joints_out_of_reach", |b| {
        b.iter(|| inv_kin.compute_joints(black_box(&far_target)))
    });

    c.bench_function("compute_joints_all_seeds", |b| {
        b.iter(|| inv_kin.compute_joints(black_box(&off_plane_target)))
    });
}

criterion_group!(benches, fwd_kin_benchmark, inv_kin_benchmark);
criterion_main!(benches);
