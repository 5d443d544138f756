use approx::assert_relative_eq;
use epnp::{bridge, solve, EPnPResult, Error, Float, Intrinsics, Solver};
use glam::{vec2, vec3, Mat3, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const K: Intrinsics = Intrinsics::new(800., 800., 320., 320.);

fn random_rotation(rng: &mut StdRng) -> Mat3 {
    let axis = vec3(
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
    );
    let axis = axis.try_normalize().unwrap_or(Vec3::Z);
    Mat3::from_axis_angle(axis, rng.gen_range(-3.0..3.0))
}

fn random_points(rng: &mut StdRng, n: usize) -> Vec<Vec3> {
    (0..n)
        .map(|_| {
            vec3(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
        })
        .collect()
}

fn gaussian(rng: &mut StdRng, sigma: f32) -> f32 {
    let u1: f32 = 1. - rng.gen::<f32>();
    let u2: f32 = rng.gen();
    sigma * (-2. * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

fn project(points: &[Vec3], r: Mat3, t: Vec3) -> Vec<Vec2> {
    points.iter().map(|&p| K.project_point(r * p + t)).collect()
}

fn assert_pose(result: &EPnPResult, r: Mat3, t: Vec3, r_eps: Float, t_eps: Float) {
    assert!(result.success(), "{:?}", result.failure());
    let rows = result.rotation();
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            let expected = r.col(j)[i] as Float;
            assert!(
                (v - expected).abs() < r_eps,
                "R[{i}][{j}] = {v}, expected {expected}"
            );
        }
    }
    for (&v, expected) in result.translation().iter().zip(t.to_array()) {
        assert!(
            (v - expected as Float).abs() < t_eps,
            "t = {:?}, expected {t}",
            result.translation()
        );
    }
}

#[test]
fn test_identity_pose() {
    let p3d = [
        vec3(0., 0., 0.),
        vec3(1., 0., 0.),
        vec3(0., 1., 0.),
        vec3(0., 0., 1.),
        vec3(1., 1., 0.),
        vec3(1., 0., 1.),
        vec3(0., 1., 1.),
        vec3(1., 1., 1.),
    ];
    let t = vec3(0., 0., 5.);
    let p2d = project(&p3d, Mat3::IDENTITY, t);
    assert_eq!(p2d[1], vec2(480., 320.));

    let result = solve(&p3d, &p2d, &K);
    assert_pose(&result, Mat3::IDENTITY, t, 1e-3, 1e-3);
    assert!(result.rms_error() < 1e-2);
    assert!(result.model_order().is_some());
}

#[test]
fn test_random_poses() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..25 {
        let n = rng.gen_range(6..40);
        let p3d = random_points(&mut rng, n);
        let r = random_rotation(&mut rng);
        let t = vec3(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5), rng.gen_range(4.0..8.0));
        let p2d = project(&p3d, r, t);

        let result = solve(&p3d, &p2d, &K);
        assert_pose(&result, r, t, 1e-3, 1e-2);
        assert!(result.rms_error() < 1e-2, "rms {}", result.rms_error());
    }
}

#[test]
fn test_successful_rotations_are_orthonormal() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..25 {
        let p3d = random_points(&mut rng, 12);
        let r = random_rotation(&mut rng);
        let t = vec3(0., 0., rng.gen_range(3.0..10.0));
        let p2d: Vec<Vec2> = project(&p3d, r, t)
            .into_iter()
            .map(|uv| uv + vec2(gaussian(&mut rng, 1.), gaussian(&mut rng, 1.)))
            .collect();

        let result = solve(&p3d, &p2d, &K);
        if result.success() {
            assert!(result.pose().orthonormality_error() <= 1e-6);
            assert!(result.rotation_matrix().determinant() > 0.);
        }
    }
}

#[test]
fn test_reported_rms_matches_pose() {
    let mut rng = StdRng::seed_from_u64(3);
    let p3d = random_points(&mut rng, 20);
    let r = random_rotation(&mut rng);
    let t = vec3(0.2, -0.1, 6.);
    let p2d: Vec<Vec2> = project(&p3d, r, t)
        .into_iter()
        .map(|uv| uv + vec2(gaussian(&mut rng, 2.), gaussian(&mut rng, 2.)))
        .collect();

    let result = solve(&p3d, &p2d, &K);
    assert!(result.success());

    let rows = result.rotation();
    let tv = result.translation();
    let sum_sq: Float = p3d
        .iter()
        .zip(&p2d)
        .map(|(p, uv)| {
            let p = [p.x as Float, p.y as Float, p.z as Float];
            let c: [Float; 3] =
                std::array::from_fn(|i| rows[i][0] * p[0] + rows[i][1] * p[1] + rows[i][2] * p[2] + tv[i]);
            let u = K.fx * c[0] / c[2] + K.cx;
            let v = K.fy * c[1] / c[2] + K.cy;
            (u - uv.x as Float).powi(2) + (v - uv.y as Float).powi(2)
        })
        .sum();
    let rms = (sum_sq / p3d.len() as Float).sqrt();
    assert_relative_eq!(result.rms_error(), rms, epsilon = 1e-9);
}

#[test]
fn test_degenerate_object_points_fail() {
    let mut rng = StdRng::seed_from_u64(5);
    let t = vec3(0., 0., 6.);

    let coplanar: Vec<Vec3> = random_points(&mut rng, 10)
        .into_iter()
        .map(|p| vec3(p.x, p.y, 0.))
        .collect();
    let result = solve(&coplanar, &project(&coplanar, Mat3::from_rotation_x(0.3), t), &K);
    assert!(!result.success());
    assert!(matches!(result.failure(), Some(Error::DegenerateGeometry(_))));

    let collinear: Vec<Vec3> = (0..8).map(|i| vec3(i as f32 * 0.1, i as f32 * 0.2, 0.)).collect();
    let result = solve(&collinear, &project(&collinear, Mat3::IDENTITY, t), &K);
    assert!(!result.success());
    assert!(matches!(result.failure(), Some(Error::DegenerateGeometry(_))));
}

#[test]
fn test_minimal_correspondences() {
    let p3d = [
        vec3(0., 0., 0.),
        vec3(1., 0., 0.),
        vec3(0., 1., 0.),
        vec3(0., 0., 1.),
    ];
    let t = vec3(0., 0., 5.);
    let p2d = project(&p3d, Mat3::IDENTITY, t);

    let mut solver = Solver::<epnp::DefaultParameters>::new(4);
    solver.set_camera(K);
    solver.set_correspondences(&p3d, &p2d).unwrap();
    let result = solver.compute();
    assert_pose(&result, Mat3::IDENTITY, t, 1e-3, 1e-3);
    assert!(result.rms_error() < 1e-2, "rms {}", result.rms_error());

    let r = Mat3::from_rotation_x(0.4) * Mat3::from_rotation_z(-0.6);
    let t = vec3(0.3, -0.2, 5.);
    let result = solve(&p3d, &project(&p3d, r, t), &K);
    assert_pose(&result, r, t, 1e-3, 1e-2);
}

fn volume(p: &[Vec3]) -> f32 {
    (p[1] - p[0]).cross(p[2] - p[0]).dot(p[3] - p[0])
}

#[test]
fn test_random_tetrahedra() {
    let mut rng = StdRng::seed_from_u64(17);
    let mut solved = 0;
    for _ in 0..100 {
        let p3d = loop {
            let p3d = random_points(&mut rng, 4);
            if volume(&p3d).abs() > 0.2 {
                break p3d;
            }
        };
        let r = random_rotation(&mut rng);
        let t = vec3(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5), rng.gen_range(4.0..8.0));
        let p2d = project(&p3d, r, t);

        let result = solve(&p3d, &p2d, &K);
        if result.success() {
            assert_pose(&result, r, t, 1e-2, 5e-2);
            solved += 1;
        }
    }
    assert!(solved >= 90, "only {solved} of 100 tetrahedra solved");
}

#[test]
fn test_noisy_correspondences() {
    let mut rng = StdRng::seed_from_u64(42);
    let p3d = random_points(&mut rng, 50);
    let r = random_rotation(&mut rng);
    let t = vec3(0.1, 0.2, 6.);
    let p2d: Vec<Vec2> = project(&p3d, r, t)
        .into_iter()
        .map(|uv| uv + vec2(gaussian(&mut rng, 0.5), gaussian(&mut rng, 0.5)))
        .collect();

    let result = solve(&p3d, &p2d, &K);
    assert_pose(&result, r, t, 0.05, 0.15);
    assert!(
        (0.2..1.).contains(&result.rms_error()),
        "rms {}",
        result.rms_error()
    );
}

#[test]
fn test_flat_bridge_agrees_with_solver() {
    let mut rng = StdRng::seed_from_u64(9);
    let p3d = random_points(&mut rng, 10);
    let r = random_rotation(&mut rng);
    let t = vec3(-0.3, 0.1, 7.);
    let p2d = project(&p3d, r, t);

    let world: Vec<f32> = p3d.iter().flat_map(|p| p.to_array()).collect();
    let image: Vec<f32> = p2d.iter().flat_map(|p| p.to_array()).collect();
    let raw = bridge::solve_flat(&world, &image, p3d.len(), [800., 800., 320., 320.]);
    let result = solve(&p3d, &p2d, &K);

    assert_eq!(raw, bridge::RawPose::from(&result));
    assert_eq!(raw.success, 1);
    assert_relative_eq!(raw.translation[2], 7., epsilon = 1e-2);
}
