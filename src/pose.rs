use glam::{Mat3, Vec3};
use nalgebra::{convert, Rotation3, SMatrix, SVector};

use crate::{Error, Float, Intrinsics, ModelOrder, NMat3, NVec2, NVec3, Parameters};

/// A rigid transform from the object frame into the camera frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub rotation: NMat3,
    pub translation: NVec3,
}

impl Default for Pose {
    fn default() -> Self {
        Pose {
            rotation: NMat3::identity(),
            translation: NVec3::zeros(),
        }
    }
}

impl Pose {
    /// Align object-frame points with their camera-frame counterparts.
    ///
    /// Both sets are centred and the rotation is the nearest rotation to
    /// their cross-covariance (orthogonal Procrustes). The translation maps
    /// the object centroid onto the camera centroid.
    ///
    /// Both slices must have the same length.
    pub fn align<P: Parameters>(object: &[NVec3], camera: &[NVec3]) -> Pose {
        let n = object.len() as Float;
        let object_mean = object.iter().fold(NVec3::zeros(), |acc, p| acc + p) / n;
        let camera_mean = camera.iter().fold(NVec3::zeros(), |acc, p| acc + p) / n;

        let mut cross = NMat3::zeros();
        for (o, c) in object.iter().zip(camera) {
            cross += (c - camera_mean) * (o - object_mean).transpose();
        }

        let rotation = P::nearest_rotation_matrix(&cross);
        let translation = camera_mean - rotation * object_mean;
        Pose {
            rotation,
            translation,
        }
    }

    pub fn transform(&self, p: &NVec3) -> NVec3 {
        self.rotation * p + self.translation
    }

    /// Root-mean-square pixel distance between the projections of
    /// `points_3d` and `points_2d`.
    pub fn rms_reprojection_error(
        &self,
        points_3d: &[NVec3],
        points_2d: &[NVec2],
        intrinsics: &Intrinsics,
    ) -> Float {
        let sum_sq: Float = points_3d
            .iter()
            .zip(points_2d)
            .map(|(p, uv)| (intrinsics.project(&self.transform(p)) - uv).magnitude_squared())
            .sum();
        (sum_sq / points_3d.len() as Float).sqrt()
    }

    /// How far the rotation is from orthonormal: the larger of `‖RRᵗ - I‖`
    /// and `|det R - 1|`.
    pub fn orthonormality_error(&self) -> Float {
        let r = &self.rotation;
        let gram = (r * r.transpose() - NMat3::identity()).norm();
        let det = (r.determinant() - 1.).abs();
        if gram.is_nan() || det.is_nan() {
            return Float::NAN;
        }
        gram.max(det)
    }
}

/// The outcome of a solve.
///
/// A result is always produced. When [`EPnPResult::success()`] is false the
/// pose is a best-effort estimate kept for diagnostics, and
/// [`EPnPResult::failure()`] says what went wrong.
#[derive(Clone, Debug, PartialEq)]
pub struct EPnPResult {
    pub(crate) pose: Pose,
    pub(crate) rms_error: Float,
    pub(crate) model_order: Option<ModelOrder>,
    pub(crate) failure: Option<Error>,
}

impl EPnPResult {
    /// A result for a solve that produced no candidate at all.
    pub fn failed(error: Error) -> EPnPResult {
        EPnPResult {
            pose: Pose::default(),
            rms_error: Float::MAX,
            model_order: None,
            failure: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// The rotation from object to camera frame, row-major.
    pub fn rotation(&self) -> [[Float; 3]; 3] {
        let r = &self.pose.rotation;
        std::array::from_fn(|i| std::array::from_fn(|j| r[(i, j)]))
    }

    pub fn translation(&self) -> [Float; 3] {
        self.pose.translation.into()
    }

    /// A rotation matrix that will rotate points from the reference object
    /// into 3D space which will line up with the projected points.
    pub fn rotation_matrix(&self) -> Mat3 {
        let mat: SMatrix<f32, 3, 3> = convert(self.pose.rotation);
        mat.into()
    }

    /// A translation to apply along with the rotation to transform reference
    /// object points such that they match the projection points.
    pub fn translation_vector(&self) -> Vec3 {
        let t: SVector<f32, 3> = convert(self.pose.translation);
        t.into()
    }

    /// The rotation as an axis scaled by the angle in radians.
    pub fn rotation_vector(&self) -> [Float; 3] {
        Rotation3::from_matrix_unchecked(self.pose.rotation)
            .scaled_axis()
            .into()
    }

    /// Root-mean-square reprojection error in pixels.
    ///
    /// [`Float::MAX`] if no candidate could be scored.
    pub fn rms_error(&self) -> Float {
        self.rms_error
    }

    /// The model order of the candidate that was selected.
    pub fn model_order(&self) -> Option<ModelOrder> {
        self.model_order
    }
}
