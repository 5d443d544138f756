//! Implementation of the EPnP perspective-n-point algorithm.
//!
//! This can be used to determine the pose of a 3D object given two sets of
//! corresponding points: a set of 3D points from the object and the pixel
//! coordinates they project to in a calibrated camera image.
//!
//! EPnP expresses every object point as an affine combination of four
//! control points, recovers the camera-frame control points from the null
//! space of a linear system, and aligns them with the object-frame control
//! points. Several candidate solutions are built from one to four null-space
//! vectors and the one with the lowest reprojection error wins.
//!
//! See the paper for more information about EPnP:
//! V. Lepetit, F. Moreno-Noguer, P. Fua, "EPnP: An Accurate O(n) Solution
//! to the PnP Problem", IJCV 2009.
//!
//! ```
//! use epnp::{Intrinsics, Solver};
//! use glam::vec3;
//!
//! let world = [
//!     vec3(0., 0., 0.),
//!     vec3(1., 0., 0.),
//!     vec3(0., 1., 0.),
//!     vec3(0., 0., 1.),
//!     vec3(1., 1., 0.),
//!     vec3(1., 0., 1.),
//! ];
//! let intrinsics = Intrinsics::new(800., 800., 320., 320.);
//! let image = world.map(|p| intrinsics.project_point(p + vec3(0., 0., 5.)));
//!
//! let mut solver = Solver::<epnp::DefaultParameters>::new(world.len());
//! solver.set_camera(intrinsics);
//! solver.set_correspondences(&world, &image).unwrap();
//!
//! let result = solver.compute();
//! assert!(result.success());
//! assert!(result.rms_error() < 1e-2);
//! assert!((result.translation()[2] - 5.).abs() < 1e-3);
//! ```

use glam::{Vec2, Vec3};
use nalgebra::{convert, Matrix3, SMatrix, SVector, Vector2, Vector3};

pub mod bridge;
mod betas;
mod control;
mod error;
pub mod flow;
mod p3p;
mod params;
mod pose;
mod solver;
mod system;

pub use betas::ModelOrder;
pub use control::{Alphas, ControlPoints};
pub use error::Error;
pub use params::{
    eigen_vectors_svd, eigen_vectors_symmetric, nearest_rotation_matrix_svd, DefaultParameters,
    Parameters,
};
pub use pose::{EPnPResult, Pose};
pub use solver::Solver;

pub type Float = f64;
pub type NVec2 = Vector2<Float>;
pub type NVec3 = Vector3<Float>;
pub type NVec12 = SVector<Float, 12>;
pub type NMat3 = Matrix3<Float>;
pub type NMat12 = SMatrix<Float, 12, 12>;
type NVec4 = SVector<Float, 4>;
type NVec6 = SVector<Float, 6>;
type NVec10 = SVector<Float, 10>;
type NMat6x4 = SMatrix<Float, 6, 4>;
type NMat6x10 = SMatrix<Float, 6, 10>;

/// The smallest number of correspondences EPnP can work with.
pub const MIN_CORRESPONDENCES: usize = 4;

fn widen_vec3(p: Vec3) -> NVec3 {
    convert(SVector::<f32, 3>::from(p))
}

fn widen_vec2(p: Vec2) -> NVec2 {
    convert(SVector::<f32, 2>::from(p))
}

/// Pinhole camera intrinsics.
///
/// A camera-frame point `(X, Y, Z)` projects to
/// `(fx * X / Z + cx, fy * Y / Z + cy)`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Intrinsics {
    pub fx: Float,
    pub fy: Float,
    pub cx: Float,
    pub cy: Float,
}

impl Intrinsics {
    pub const fn new(fx: Float, fy: Float, cx: Float, cy: Float) -> Intrinsics {
        Intrinsics { fx, fy, cx, cy }
    }

    /// Whether these intrinsics describe a usable camera.
    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy].iter().all(|v| v.is_finite())
            && self.fx != 0.
            && self.fy != 0.
    }

    /// Project a camera-frame point to pixel coordinates.
    pub fn project(&self, p: &NVec3) -> NVec2 {
        let iz = p.z.recip();
        NVec2::new(self.fx * p.x * iz + self.cx, self.fy * p.y * iz + self.cy)
    }

    /// Project a camera-frame point to pixel coordinates.
    pub fn project_point(&self, p: Vec3) -> Vec2 {
        let uv = self.project(&widen_vec3(p));
        Vec2::new(uv.x as f32, uv.y as f32)
    }
}

/// Solve a single PnP problem without keeping a [`Solver`] around.
///
/// Failures are reported through [`EPnPResult::success()`], exactly as with
/// [`Solver::compute()`].
pub fn solve(points_3d: &[Vec3], points_2d: &[Vec2], intrinsics: &Intrinsics) -> EPnPResult {
    let mut solver = Solver::<DefaultParameters>::new(points_3d.len());
    solver.set_camera(*intrinsics);
    match solver.set_correspondences(points_3d, points_2d) {
        Ok(()) => solver.compute(),
        Err(error) => EPnPResult::failed(error),
    }
}
