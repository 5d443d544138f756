use nalgebra::Matrix;

use crate::{Float, NMat12, NMat3, NVec12, NVec3};

/// Parameters used by the EPnP algorithm.
pub trait Parameters {
    /// Smallest-to-largest variance ratio below which the object points are
    /// treated as coplanar or collinear.
    const DEGENERATE_EIGENVALUE_RATIO: Float;
    /// Singular values below this are ignored by the small least-squares solves.
    const LEAST_SQUARES_EPSILON: Float;
    const GAUSS_NEWTON_ITERATIONS: usize;
    /// Refinement stops once a step is shorter than this.
    const GAUSS_NEWTON_TOLERANCE: Float;
    /// RMS reprojection error (in pixels) above which a candidate has diverged.
    const DIVERGENCE_THRESHOLD: Float;
    const ORTHONORMALITY_TOLERANCE: Float;

    /// Eigenvectors (as columns) and eigenvalues of the symmetric positive
    /// semi-definite matrix `m`, sorted by decreasing eigenvalue.
    fn eigen_vectors(m: &NMat12) -> Option<(NMat12, NVec12)>;

    /// The rotation closest to `m` in the Frobenius norm.
    fn nearest_rotation_matrix(m: &NMat3) -> NMat3;
}

/// Calculate the nearest rotation matrix to `m` using SVD.
///
/// Reflections are avoided by flipping the sign of the smallest singular
/// direction when `det(UVᵗ) < 0`.
pub fn nearest_rotation_matrix_svd(m: &NMat3) -> NMat3 {
    let svd = m.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return NMat3::from_element(Float::NAN);
    };
    let det_uv = u.determinant() * v_t.determinant();
    let diagonal = NVec3::new(1., 1., det_uv.signum());
    u * Matrix::from_diagonal(&diagonal) * v_t
}

/// Generate eigenvectors and eigenvalues of `MᵗM` using SVD.
///
/// For a symmetric positive semi-definite matrix the left singular vectors
/// are its eigenvectors and the singular values are its eigenvalues, already
/// sorted in decreasing order.
pub fn eigen_vectors_svd(m: &NMat12) -> Option<(NMat12, NVec12)> {
    let svd = m.svd(true, false);
    let u = svd.u?;
    Some((u, svd.singular_values))
}

/// Generate eigenvectors and eigenvalues of `MᵗM` using a symmetric
/// eigen-decomposition.
///
/// This is faster than [`eigen_vectors_svd`] but small negative eigenvalues
/// may be returned for rank-deficient input.
pub fn eigen_vectors_symmetric(m: &NMat12) -> Option<(NMat12, NVec12)> {
    let eigen = m.symmetric_eigen();
    let mut order: [usize; 12] = std::array::from_fn(|i| i);
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let vectors = NMat12::from_fn(|r, c| eigen.eigenvectors[(r, order[c])]);
    let values = NVec12::from_fn(|i, _| eigen.eigenvalues[order[i]]);
    Some((vectors, values))
}

/// Default parameters for the EPnP algorithm.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultParameters;

impl Parameters for DefaultParameters {
    const DEGENERATE_EIGENVALUE_RATIO: Float = 1e-6;
    const LEAST_SQUARES_EPSILON: Float = 1e-12;
    const GAUSS_NEWTON_ITERATIONS: usize = 10;
    const GAUSS_NEWTON_TOLERANCE: Float = 1e-12;
    const DIVERGENCE_THRESHOLD: Float = 1e6;
    const ORTHONORMALITY_TOLERANCE: Float = 1e-6;

    fn eigen_vectors(m: &NMat12) -> Option<(NMat12, NVec12)> {
        eigen_vectors_svd(m)
    }

    fn nearest_rotation_matrix(m: &NMat3) -> NMat3 {
        nearest_rotation_matrix_svd(m)
    }
}
