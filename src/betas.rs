//! Recovery of the null-space coefficients ("betas").
//!
//! The camera-frame control points are `x = Σ βₖ vₖ` for the null-space
//! vectors `vₖ`. The distances between control points are known from the
//! object frame, which gives six quadratic equations in the betas. Writing
//! every product `βₐβᵦ` as its own unknown turns them into the linear system
//! `L β̄ = ρ`, with `L` a 6x10 matrix.

use nalgebra::SMatrix;

use crate::control::{ControlPoints, PAIRS};
use crate::system::NullSpace;
use crate::{Float, NMat6x10, NMat6x4, NVec10, NVec12, NVec3, NVec4, NVec6};

/// Index pairs `(a, b)` of the beta products `βₐβᵦ`, in column order of `L`.
const PRODUCTS: [(usize, usize); 10] = [
    (0, 0),
    (0, 1),
    (1, 1),
    (0, 2),
    (1, 2),
    (2, 2),
    (0, 3),
    (1, 3),
    (2, 3),
    (3, 3),
];

/// Number of null-space vectors a pose candidate is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelOrder {
    One,
    Two,
    Three,
    Four,
}

impl ModelOrder {
    pub const ALL: [ModelOrder; 4] = [
        ModelOrder::One,
        ModelOrder::Two,
        ModelOrder::Three,
        ModelOrder::Four,
    ];

    pub fn dimension(self) -> usize {
        match self {
            ModelOrder::One => 1,
            ModelOrder::Two => 2,
            ModelOrder::Three => 3,
            ModelOrder::Four => 4,
        }
    }
}

fn products(betas: &NVec4) -> NVec10 {
    NVec10::from(PRODUCTS.map(|(a, b)| betas[a] * betas[b]))
}

fn control_point(x: &NVec12, index: usize) -> NVec3 {
    x.fixed_rows::<3>(3 * index).into()
}

/// The distance constraints `L β̄ = ρ` for one null space.
#[derive(Clone, Debug)]
pub(crate) struct DistanceConstraints {
    l: NMat6x10,
    rho: NVec6,
    /// Control point differences of the smallest null-space vector, per pair.
    deltas: [NVec3; 6],
}

impl DistanceConstraints {
    pub fn new(null_space: &NullSpace, control: &ControlPoints) -> DistanceConstraints {
        let dv: [[NVec3; 6]; 4] = std::array::from_fn(|k| {
            let v = null_space.vector(k);
            PAIRS.map(|(a, b)| control_point(v, a) - control_point(v, b))
        });

        let mut l = NMat6x10::zeros();
        for row in 0..6 {
            for (col, &(a, b)) in PRODUCTS.iter().enumerate() {
                let scale = if a == b { 1. } else { 2. };
                l[(row, col)] = scale * dv[a][row].dot(&dv[b][row]);
            }
        }

        DistanceConstraints {
            l,
            rho: control.squared_distances(),
            deltas: dv[0],
        }
    }

    /// The columns of `L` for a subset of beta products.
    fn columns<const N: usize>(&self, columns: [usize; N]) -> SMatrix<Float, 6, N> {
        SMatrix::from_fn(|r, c| self.l[(r, columns[c])])
    }

    /// Closed-form starting betas for a model order.
    ///
    /// Returns `None` when the fit for that order is unusable.
    pub fn initial_betas(&self, order: ModelOrder, epsilon: Float) -> Option<[Float; 4]> {
        let betas = match order {
            ModelOrder::One => {
                let (num, den) = self.deltas.iter().zip(self.rho.iter()).fold(
                    (0., 0.),
                    |(num, den), (dv, &rho)| {
                        let len = dv.magnitude();
                        (num + len * rho.sqrt(), den + len * len)
                    },
                );
                if den <= epsilon {
                    return None;
                }
                [num / den, 0., 0., 0.]
            }
            ModelOrder::Two => {
                // β11, β12, β22
                let x = self.columns([0, 1, 2]).svd(true, true).solve(&self.rho, epsilon).ok()?;
                let mut betas = [0.; 4];
                if x[0] < 0. {
                    betas[0] = (-x[0]).sqrt();
                    betas[1] = if x[2] < 0. { (-x[2]).sqrt() } else { 0. };
                } else {
                    betas[0] = x[0].sqrt();
                    betas[1] = if x[2] > 0. { x[2].sqrt() } else { 0. };
                }
                if x[1] < 0. {
                    betas[0] = -betas[0];
                }
                betas
            }
            ModelOrder::Three => {
                // β11, β12, β22, β13, β23
                let x = self
                    .columns([0, 1, 2, 3, 4])
                    .svd(true, true)
                    .solve(&self.rho, epsilon)
                    .ok()?;
                let mut betas = [0.; 4];
                if x[0] < 0. {
                    betas[0] = (-x[0]).sqrt();
                    betas[1] = if x[2] < 0. { (-x[2]).sqrt() } else { 0. };
                } else {
                    betas[0] = x[0].sqrt();
                    betas[1] = if x[2] > 0. { x[2].sqrt() } else { 0. };
                }
                if x[1] < 0. {
                    betas[0] = -betas[0];
                }
                if betas[0] == 0. {
                    return None;
                }
                betas[2] = x[3] / betas[0];
                betas
            }
            ModelOrder::Four => {
                // β11, β12, β13, β14
                let x = self.columns([0, 1, 3, 6]).svd(true, true).solve(&self.rho, epsilon).ok()?;
                let b0 = x[0].abs().sqrt();
                if b0 == 0. {
                    return None;
                }
                let sign = if x[0] < 0. { -1. } else { 1. };
                [b0, sign * x[1] / b0, sign * x[2] / b0, sign * x[3] / b0]
            }
        };

        betas.iter().all(|b| b.is_finite()).then_some(betas)
    }

    /// Residuals `ρ - L β̄` of the distance constraints.
    pub fn residuals(&self, betas: &[Float; 4]) -> NVec6 {
        self.rho - self.l * products(&NVec4::from(*betas))
    }

    /// Refine betas with Gauss-Newton on the distance constraints.
    ///
    /// Runs at most `iterations` steps and stops early once a step is shorter
    /// than `tolerance` or the linearised system cannot be solved.
    pub fn refine(
        &self,
        betas: [Float; 4],
        iterations: usize,
        tolerance: Float,
        epsilon: Float,
    ) -> [Float; 4] {
        let mut b = NVec4::from(betas);

        for _ in 0..iterations {
            let mut jacobian = NMat6x4::zeros();
            for row in 0..6 {
                for (col, &(i, j)) in PRODUCTS.iter().enumerate() {
                    let l = self.l[(row, col)];
                    jacobian[(row, i)] += l * b[j];
                    jacobian[(row, j)] += l * b[i];
                }
            }
            let residual = self.residuals(&b.into());

            let Ok(step) = jacobian.svd(true, true).solve(&residual, epsilon) else {
                break;
            };
            if !step.iter().all(|v| v.is_finite()) {
                break;
            }

            b += step;
            if step.magnitude() < tolerance {
                break;
            }
        }

        b.into()
    }
}

/// Camera-frame control points for a set of betas.
///
/// The overall sign of a null-space solution is arbitrary, so the points are
/// flipped if needed to put the centroid control point in front of the camera.
pub(crate) fn camera_control_points(null_space: &NullSpace, betas: &[Float; 4]) -> [NVec3; 4] {
    let x = null_space.combine(betas);
    let mut points: [NVec3; 4] = std::array::from_fn(|i| control_point(&x, i));
    if points[0].z < 0. {
        for p in &mut points {
            *p = -*p;
        }
    }
    points
}
