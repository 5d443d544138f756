//! Control point selection and barycentric encoding.

use nalgebra::linalg::SymmetricEigen;

use crate::{Error, Float, NMat3, NVec3, NVec6, MIN_CORRESPONDENCES};

/// Barycentric weights of one point with respect to the four control points.
///
/// The weights always sum to one.
pub type Alphas = [Float; 4];

/// Pairs of control points whose distances constrain the solution, in the
/// order used for the rows of the distance constraint system.
pub(crate) const PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Affine combination of four points.
pub(crate) fn combine(points: &[NVec3; 4], alphas: &Alphas) -> NVec3 {
    points
        .iter()
        .zip(alphas)
        .fold(NVec3::zeros(), |acc, (p, &a)| acc + a * p)
}

/// Six times the signed volume of the tetrahedron spanned by four points.
///
/// The sign gives the handedness of the tetrahedron.
pub(crate) fn signed_volume(points: &[NVec3; 4]) -> Float {
    let [a, b, c, d] = points;
    (b - a).cross(&(c - a)).dot(&(d - a))
}

/// The four object-frame control points.
///
/// The first control point is the centroid of the object points, the other
/// three lie along the principal axes of the point cloud at one standard
/// deviation from the centroid, largest axis first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlPoints {
    points: [NVec3; 4],
}

impl ControlPoints {
    /// Choose control points spanning `points`.
    ///
    /// Fails with [`Error::DegenerateGeometry`] when the smallest variance of
    /// the point cloud is below `degenerate_ratio` times its largest variance,
    /// which is the case for coplanar, collinear and coincident points.
    pub fn select(points: &[NVec3], degenerate_ratio: Float) -> Result<ControlPoints, Error> {
        if points.len() < MIN_CORRESPONDENCES {
            return Err(Error::InsufficientCorrespondences {
                required: MIN_CORRESPONDENCES,
                actual: points.len(),
            });
        }

        let n = points.len() as Float;
        let centroid = points.iter().fold(NVec3::zeros(), |acc, p| acc + p) / n;

        let mut covariance = NMat3::zeros();
        for p in points {
            let d = p - centroid;
            covariance += d * d.transpose();
        }
        covariance /= n;

        let eigen = SymmetricEigen::new(covariance);
        let values = eigen.eigenvalues;
        let mut order = [0, 1, 2];
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

        let largest = values[order[0]];
        if !largest.is_finite() || largest <= 0. {
            return Err(Error::DegenerateGeometry("object points coincide"));
        }

        let threshold = degenerate_ratio * largest;
        if values[order[1]] < threshold {
            return Err(Error::DegenerateGeometry("object points are collinear"));
        }
        if values[order[2]] < threshold {
            return Err(Error::DegenerateGeometry("object points are coplanar"));
        }

        let mut control = [centroid; 4];
        for (c, &axis) in control[1..].iter_mut().zip(&order) {
            let direction: NVec3 = eigen.eigenvectors.column(axis).into();
            *c += values[axis].sqrt() * direction;
        }

        Ok(ControlPoints { points: control })
    }

    pub fn points(&self) -> &[NVec3; 4] {
        &self.points
    }

    /// Express every point as barycentric weights over the control points.
    ///
    /// One 3x3 inversion is shared by all points.
    pub fn barycentric(&self, points: &[NVec3]) -> Result<Vec<Alphas>, Error> {
        let c0 = self.points[0];
        let basis = NMat3::from_columns(&[
            self.points[1] - c0,
            self.points[2] - c0,
            self.points[3] - c0,
        ]);
        let inverse = basis
            .try_inverse()
            .filter(|m| m.iter().all(|v| v.is_finite()))
            .ok_or(Error::DegenerateGeometry("control points are singular"))?;

        Ok(points
            .iter()
            .map(|p| {
                let l = inverse * (p - c0);
                [1. - l.x - l.y - l.z, l.x, l.y, l.z]
            })
            .collect())
    }

    /// Rebuild a point from its barycentric weights.
    pub fn reconstruct(&self, alphas: &Alphas) -> NVec3 {
        combine(&self.points, alphas)
    }

    /// Squared distances between each pair of control points.
    pub(crate) fn squared_distances(&self) -> NVec6 {
        NVec6::from(PAIRS.map(|(a, b)| (self.points[a] - self.points[b]).magnitude_squared()))
    }
}
