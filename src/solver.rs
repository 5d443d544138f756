use std::marker::PhantomData;

use glam::{Vec2, Vec3};
use log::{debug, trace, warn};

use crate::betas::{camera_control_points, DistanceConstraints};
use crate::control::{signed_volume, ControlPoints};
use crate::p3p::{solve_triplet, TRIPLETS};
use crate::system::{NullSpace, ProjectionSystem};
use crate::{
    widen_vec2, widen_vec3, DefaultParameters, EPnPResult, Error, Float, Intrinsics, ModelOrder,
    NVec12, NVec2, NVec3, Parameters, Pose, MIN_CORRESPONDENCES,
};

/// A scored pose hypothesis.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    order: ModelOrder,
    pose: Pose,
    rms_error: Float,
}

/// An EPnP solver.
///
/// The solver holds the intrinsics and the current set of correspondences.
/// Each call to [`Self::compute()`] works only from that state, so repeated
/// solves after updating the correspondences are independent of each other.
#[derive(Clone, Debug)]
pub struct Solver<P = DefaultParameters> {
    _parameters: PhantomData<P>,
    num_points: usize,
    intrinsics: Intrinsics,
    points_3d: Vec<NVec3>,
    points_2d: Vec<NVec2>,
}

impl<P: Parameters> Solver<P> {
    /// Create a new EPnP solver for `num_points` correspondences.
    pub fn new(num_points: usize) -> Solver<P> {
        Solver {
            _parameters: PhantomData,
            num_points,
            intrinsics: Intrinsics::default(),
            points_3d: Vec::with_capacity(num_points),
            points_2d: Vec::with_capacity(num_points),
        }
    }

    /// The number of correspondences this solver was created for.
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// Set the pinhole intrinsics used by following solves.
    pub fn set_intrinsics(&mut self, fx: Float, fy: Float, cx: Float, cy: Float) {
        self.intrinsics = Intrinsics::new(fx, fy, cx, cy);
    }

    pub fn set_camera(&mut self, intrinsics: Intrinsics) {
        self.intrinsics = intrinsics;
    }

    /// Replace the stored correspondences.
    ///
    /// - `points_3d` should contain a series of points in object space.
    /// - `points_2d` should contain the pixel coordinates of their projections.
    ///
    /// Both slices must have the length given to [`Self::new()`], which must
    /// be at least 4. On error the stored correspondences are cleared.
    pub fn set_correspondences(&mut self, points_3d: &[Vec3], points_2d: &[Vec2]) -> Result<(), Error> {
        self.points_3d.clear();
        self.points_2d.clear();

        if points_3d.len() != points_2d.len() {
            return Err(Error::MismatchedCorrespondences {
                world: points_3d.len(),
                image: points_2d.len(),
            });
        }
        if points_3d.len() < MIN_CORRESPONDENCES {
            return Err(Error::InsufficientCorrespondences {
                required: MIN_CORRESPONDENCES,
                actual: points_3d.len(),
            });
        }
        if points_3d.len() != self.num_points {
            return Err(Error::UnexpectedCount {
                expected: self.num_points,
                actual: points_3d.len(),
            });
        }

        self.points_3d.extend(points_3d.iter().map(|&p| widen_vec3(p)));
        self.points_2d.extend(points_2d.iter().map(|&p| widen_vec2(p)));
        Ok(())
    }

    /// Solve for the pose of the stored correspondences.
    ///
    /// This always produces a result; check [`EPnPResult::success()`] before
    /// trusting the pose.
    pub fn compute(&self) -> EPnPResult {
        let result = match self.try_compute() {
            Ok(result) => result,
            Err(error) => EPnPResult::failed(error),
        };

        if let Some(error) = result.failure() {
            warn!("EPnP solve failed: {error} (rms {})", result.rms_error());
        }
        result
    }

    fn try_compute(&self) -> Result<EPnPResult, Error> {
        if self.points_3d.len() < MIN_CORRESPONDENCES {
            return Err(Error::InsufficientCorrespondences {
                required: MIN_CORRESPONDENCES,
                actual: self.points_3d.len(),
            });
        }
        if !self.intrinsics.is_valid() {
            return Err(Error::InvalidIntrinsics);
        }

        let control = ControlPoints::select(&self.points_3d, P::DEGENERATE_EIGENVALUE_RATIO)?;
        let alphas = control.barycentric(&self.points_3d)?;
        let system = ProjectionSystem::build(&alphas, &self.points_2d, &self.intrinsics);

        let (vectors, values) =
            P::eigen_vectors(&system.normal_matrix()).ok_or(Error::NumericDivergence)?;
        let null_space = NullSpace::from_sorted_eigen(&vectors, &values);
        trace!("null-space eigenvalues: {:?}", null_space.eigenvalues());

        let constraints = DistanceConstraints::new(&null_space, &control);

        let mut seeds: Vec<(ModelOrder, [Float; 4])> = ModelOrder::ALL
            .iter()
            .filter_map(|&order| match constraints.initial_betas(order, P::LEAST_SQUARES_EPSILON) {
                Some(betas) => Some((order, betas)),
                None => {
                    debug!("model order {order:?}: no initial betas");
                    None
                }
            })
            .collect();
        if self.points_3d.len() == MIN_CORRESPONDENCES {
            seeds.extend(self.minimal_seeds(&control, &null_space));
        }

        let best = seeds
            .into_iter()
            .filter_map(|(order, betas)| self.candidate(order, betas, &control, &null_space, &constraints))
            .fold(None, |best: Option<Candidate>, next| match best {
                Some(best) if best.rms_error <= next.rms_error => Some(best),
                _ => Some(next),
            })
            .ok_or(Error::NumericDivergence)?;

        // Candidate errors are never NaN, so an infinite error lands here too.
        let failure = if best.rms_error > P::DIVERGENCE_THRESHOLD {
            Some(Error::NumericDivergence)
        } else {
            let error = best.pose.orthonormality_error();
            if error <= P::ORTHONORMALITY_TOLERANCE {
                None
            } else {
                Some(Error::OrthonormalityViolation(error))
            }
        };

        Ok(EPnPResult {
            pose: best.pose,
            rms_error: best.rms_error,
            model_order: Some(best.order),
            failure,
        })
    }

    /// Betas of the poses solved from every triplet of correspondences.
    ///
    /// Four correspondences leave the whole null space consistent with the
    /// image, so these seeds stand in for the missing constraints.
    fn minimal_seeds(&self, control: &ControlPoints, null_space: &NullSpace) -> Vec<(ModelOrder, [Float; 4])> {
        TRIPLETS
            .iter()
            .flat_map(|&triplet| {
                solve_triplet::<P>(&self.points_3d, &self.points_2d, triplet, &self.intrinsics)
            })
            .map(|pose| {
                let mut x = NVec12::zeros();
                for (j, c) in control.points().iter().enumerate() {
                    x.fixed_rows_mut::<3>(3 * j).copy_from(&pose.transform(c));
                }
                (ModelOrder::Four, null_space.project(&x))
            })
            .collect()
    }

    fn candidate(
        &self,
        order: ModelOrder,
        betas: [Float; 4],
        control: &ControlPoints,
        null_space: &NullSpace,
        constraints: &DistanceConstraints,
    ) -> Option<Candidate> {
        let betas = constraints.refine(
            betas,
            P::GAUSS_NEWTON_ITERATIONS,
            P::GAUSS_NEWTON_TOLERANCE,
            P::LEAST_SQUARES_EPSILON,
        );

        let camera = camera_control_points(null_space, &betas);
        // A proper rotation cannot map a tetrahedron onto its mirror image.
        if signed_volume(&camera) * signed_volume(control.points()) <= 0. {
            debug!("model order {order:?}: betas {betas:?} give a mirrored tetrahedron");
            return None;
        }

        let pose = Pose::align::<P>(control.points(), &camera);
        let rms_error = pose.rms_reprojection_error(&self.points_3d, &self.points_2d, &self.intrinsics);
        debug!("model order {order:?}: betas {betas:?}, rms {rms_error}");

        Some(Candidate {
            order,
            pose,
            rms_error: if rms_error.is_nan() { Float::INFINITY } else { rms_error },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{vec3, EulerRot, Mat3, Quat};

    const K: Intrinsics = Intrinsics::new(800., 800., 320., 240.);

    fn cube() -> Vec<Vec3> {
        vec![
            vec3(-1., -1., -1.),
            vec3(1., -1., -1.),
            vec3(-1., 1., -1.),
            vec3(1., 1., -1.),
            vec3(-1., -1., 1.),
            vec3(1., -1., 1.),
            vec3(-1., 1., 1.),
            vec3(1., 1., 1.),
        ]
    }

    fn project(points: &[Vec3], r: Mat3, t: Vec3) -> Vec<Vec2> {
        points.iter().map(|&p| K.project_point(r * p + t)).collect()
    }

    fn solver_for(p3d: &[Vec3], p2d: &[Vec2]) -> Solver {
        let mut solver = Solver::<DefaultParameters>::new(p3d.len());
        solver.set_camera(K);
        solver.set_correspondences(p3d, p2d).unwrap();
        solver
    }

    #[test]
    fn test_example_solution() {
        let p3d = cube();
        let r = Mat3::from_quat(Quat::from_euler(
            EulerRot::XYZ,
            30f32.to_radians(),
            40f32.to_radians(),
            50f32.to_radians(),
        ));
        let t = vec3(1., 2., 10.);
        let p2d = project(&p3d, r, t);

        let result = solver_for(&p3d, &p2d).compute();
        assert!(result.success(), "{:?}", result.failure());
        assert!(result.rms_error() < 1e-2, "rms {}", result.rms_error());

        let s_r = result.rotation_matrix();
        let s_t = result.translation_vector();
        for (&p, expected) in p3d.iter().zip(p3d.iter().map(|&p| r * p + t)) {
            let actual = s_r * p + s_t;
            assert!(
                (actual - expected).length() < 1e-3,
                "expected {expected} got {actual}"
            );
        }
    }

    #[test]
    fn test_tetrahedron_in_front_of_camera() {
        // Two of the points share a ray, which leaves a mirrored tetrahedron
        // that meets every distance constraint.
        let p3d = vec![
            vec3(0., 0., 0.),
            vec3(1., 0., 0.),
            vec3(0., 1., 0.),
            vec3(0., 0., 1.),
        ];
        let t = vec3(0., 0., 5.);
        let p2d = project(&p3d, Mat3::IDENTITY, t);
        assert_eq!(p2d[0], p2d[3]);

        let result = solver_for(&p3d, &p2d).compute();
        assert!(result.success(), "{:?}", result.failure());
        assert!(result.rms_error() < 1e-2, "rms {}", result.rms_error());
        assert!(result.rotation_matrix().abs_diff_eq(Mat3::IDENTITY, 1e-3));
        assert!(result.translation_vector().abs_diff_eq(t, 1e-3));
    }

    #[test]
    fn test_set_correspondences_validation() {
        let p3d = cube();
        let p2d = project(&p3d, Mat3::IDENTITY, vec3(0., 0., 5.));

        let mut solver = Solver::<DefaultParameters>::new(8);
        assert_eq!(
            solver.set_correspondences(&p3d, &p2d[..7]),
            Err(Error::MismatchedCorrespondences { world: 8, image: 7 })
        );
        assert_eq!(
            solver.set_correspondences(&p3d[..3], &p2d[..3]),
            Err(Error::InsufficientCorrespondences {
                required: 4,
                actual: 3
            })
        );
        assert_eq!(
            solver.set_correspondences(&p3d[..6], &p2d[..6]),
            Err(Error::UnexpectedCount {
                expected: 8,
                actual: 6
            })
        );
        assert_eq!(solver.set_correspondences(&p3d, &p2d), Ok(()));
    }

    #[test]
    fn test_failed_update_clears_state() {
        let p3d = cube();
        let p2d = project(&p3d, Mat3::IDENTITY, vec3(0., 0., 5.));

        let mut solver = solver_for(&p3d, &p2d);
        assert!(solver.compute().success());

        assert!(solver.set_correspondences(&p3d, &p2d[..4]).is_err());
        let result = solver.compute();
        assert!(!result.success());
        assert_eq!(
            result.failure(),
            Some(&Error::InsufficientCorrespondences {
                required: 4,
                actual: 0
            })
        );
        assert_eq!(result.rms_error(), Float::MAX);
    }

    #[test]
    fn test_missing_intrinsics() {
        let p3d = cube();
        let p2d = project(&p3d, Mat3::IDENTITY, vec3(0., 0., 5.));
        let mut solver = Solver::<DefaultParameters>::new(p3d.len());
        solver.set_correspondences(&p3d, &p2d).unwrap();

        let result = solver.compute();
        assert_eq!(result.failure(), Some(&Error::InvalidIntrinsics));

        solver.set_intrinsics(K.fx, K.fy, K.cx, K.cy);
        assert_eq!(solver.intrinsics(), &K);
        assert!(solver.compute().success());
    }

    #[test]
    fn test_repeated_solves_are_independent() {
        let p3d = cube();
        let first = project(&p3d, Mat3::from_rotation_y(0.3), vec3(0.5, 0., 6.));
        let second = project(&p3d, Mat3::from_rotation_x(-0.2), vec3(0., -0.4, 8.));

        let mut solver = solver_for(&p3d, &first);
        let a = solver.compute();
        solver.set_correspondences(&p3d, &second).unwrap();
        let b = solver.compute();

        assert_eq!(b, solver_for(&p3d, &second).compute());
        assert_eq!(a, solver_for(&p3d, &first).compute());
        assert_relative_eq!(b.translation()[2], 8., epsilon = 1e-3);
    }

    #[test]
    fn test_coplanar_points_fail() {
        let p3d: Vec<Vec3> = cube().into_iter().map(|p| vec3(p.x, p.y, 0.)).collect();
        let p3d = [p3d, vec![vec3(0.3, 0.6, 0.)]].concat();
        let p2d = project(&p3d, Mat3::from_rotation_z(0.4), vec3(0., 0., 5.));

        let result = solver_for(&p3d, &p2d).compute();
        assert!(!result.success());
        assert_eq!(
            result.failure(),
            Some(&Error::DegenerateGeometry("object points are coplanar"))
        );
    }

    #[test]
    fn test_symmetric_eigen_parameters() {
        struct Symmetric;
        impl Parameters for Symmetric {
            const DEGENERATE_EIGENVALUE_RATIO: Float = 1e-6;
            const LEAST_SQUARES_EPSILON: Float = 1e-12;
            const GAUSS_NEWTON_ITERATIONS: usize = 10;
            const GAUSS_NEWTON_TOLERANCE: Float = 1e-12;
            const DIVERGENCE_THRESHOLD: Float = 1e6;
            const ORTHONORMALITY_TOLERANCE: Float = 1e-6;

            fn eigen_vectors(m: &crate::NMat12) -> Option<(crate::NMat12, crate::NVec12)> {
                crate::eigen_vectors_symmetric(m)
            }

            fn nearest_rotation_matrix(m: &crate::NMat3) -> crate::NMat3 {
                crate::nearest_rotation_matrix_svd(m)
            }
        }

        let p3d = cube();
        let p2d = project(&p3d, Mat3::from_rotation_y(-0.7), vec3(-0.2, 0.3, 7.));
        let mut solver = Solver::<Symmetric>::new(p3d.len());
        solver.set_camera(K);
        solver.set_correspondences(&p3d, &p2d).unwrap();

        let result = solver.compute();
        assert!(result.success());
        assert!(result.rms_error() < 1e-2);
        assert_relative_eq!(result.translation()[0], -0.2, epsilon = 1e-3);
    }
}
