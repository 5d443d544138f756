//! The linear system linking camera-frame control points to image points.

use crate::control::Alphas;
use crate::{Float, Intrinsics, NMat12, NVec12, NVec2};

/// The `2n x 12` system `M x = 0`, where `x` stacks the camera-frame
/// coordinates of the four control points.
///
/// Rows `2i` and `2i + 1` belong to correspondence `i`.
#[derive(Clone, Debug)]
pub(crate) struct ProjectionSystem {
    rows: Vec<NVec12>,
}

impl ProjectionSystem {
    pub fn build(alphas: &[Alphas], points_2d: &[NVec2], intrinsics: &Intrinsics) -> ProjectionSystem {
        let Intrinsics { fx, fy, cx, cy } = *intrinsics;
        let mut rows = Vec::with_capacity(2 * alphas.len());

        for (a, uv) in alphas.iter().zip(points_2d) {
            let mut row_u = NVec12::zeros();
            let mut row_v = NVec12::zeros();
            for (j, &alpha) in a.iter().enumerate() {
                row_u[3 * j] = alpha * fx;
                row_u[3 * j + 2] = alpha * (cx - uv.x);
                row_v[3 * j + 1] = alpha * fy;
                row_v[3 * j + 2] = alpha * (cy - uv.y);
            }
            rows.push(row_u);
            rows.push(row_v);
        }

        ProjectionSystem { rows }
    }

    #[cfg(test)]
    pub fn rows(&self) -> &[NVec12] {
        &self.rows
    }

    /// `MᵗM`, a symmetric positive semi-definite 12x12 matrix.
    pub fn normal_matrix(&self) -> NMat12 {
        self.rows
            .iter()
            .fold(NMat12::zeros(), |acc, row| acc + row * row.transpose())
    }
}

/// The eigenvectors of `MᵗM` with the four smallest eigenvalues.
///
/// Index 0 holds the vector with the smallest eigenvalue.
#[derive(Clone, Debug)]
pub(crate) struct NullSpace {
    vectors: [NVec12; 4],
    eigenvalues: [Float; 4],
}

impl NullSpace {
    /// Take the null space from eigenpairs sorted by decreasing eigenvalue.
    pub fn from_sorted_eigen(vectors: &NMat12, values: &NVec12) -> NullSpace {
        NullSpace {
            vectors: std::array::from_fn(|k| vectors.column(11 - k).into()),
            eigenvalues: std::array::from_fn(|k| values[11 - k]),
        }
    }

    pub fn vector(&self, index: usize) -> &NVec12 {
        &self.vectors[index]
    }

    pub fn eigenvalues(&self) -> &[Float; 4] {
        &self.eigenvalues
    }

    /// Coordinates of `x` in the null-space basis.
    ///
    /// The basis is orthonormal, so `combine(project(x))` is the nearest
    /// point to `x` in the null space.
    pub fn project(&self, x: &NVec12) -> [Float; 4] {
        self.vectors.map(|v| v.dot(x))
    }

    /// `Σ βₖ vₖ`
    pub fn combine(&self, betas: &[Float; 4]) -> NVec12 {
        self.vectors
            .iter()
            .zip(betas)
            .fold(NVec12::zeros(), |acc, (v, &b)| acc + b * v)
    }
}
