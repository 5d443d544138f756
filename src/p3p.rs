//! Pose hypotheses from three correspondences.
//!
//! With exactly four correspondences every beta vector satisfies the
//! projection system, and the six distance constraints are also met by
//! mirror images of the control tetrahedron. Poses solved from triplets of
//! correspondences give the beta refinement starts of the right handedness.
//!
//! The triplet solver eliminates two of the three depths from the law of
//! cosines, which leaves a quartic in the ratio of the first two depths.

use nalgebra::Matrix4;

use crate::{Float, Intrinsics, NVec2, NVec3, Parameters, Pose};

/// Every way of picking three of four correspondences.
pub(crate) const TRIPLETS: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];

/// Unit vector from the camera centre through a pixel.
fn bearing(uv: &NVec2, intrinsics: &Intrinsics) -> NVec3 {
    NVec3::new(
        (uv.x - intrinsics.cx) / intrinsics.fx,
        (uv.y - intrinsics.cy) / intrinsics.fy,
        1.,
    )
    .normalize()
}

/// Product of two polynomials with ascending coefficients, truncated to
/// degree four.
fn poly_mul(a: &[Float; 5], b: &[Float; 5]) -> [Float; 5] {
    let mut out = [0.; 5];
    for (i, &x) in a.iter().enumerate() {
        for (j, &y) in b.iter().enumerate().take(5 - i) {
            out[i + j] += x * y;
        }
    }
    out
}

/// Real roots of the quartic with ascending coefficients `c`.
///
/// Returns nothing when the leading coefficient vanishes.
fn quartic_roots(c: &[Float; 5]) -> Vec<Float> {
    if c.iter().any(|v| !v.is_finite()) {
        return Vec::new();
    }
    let scale = c.iter().fold(0., |m: Float, v| m.max(v.abs()));
    if c[4].abs() <= 1e-12 * scale {
        return Vec::new();
    }

    let mut companion = Matrix4::<Float>::zeros();
    for j in 0..4 {
        companion[(0, j)] = -c[3 - j] / c[4];
    }
    companion[(1, 0)] = 1.;
    companion[(2, 1)] = 1.;
    companion[(3, 2)] = 1.;

    companion
        .complex_eigenvalues()
        .iter()
        .filter(|z| z.im.abs() <= 1e-6 * (1. + z.re.abs()))
        .map(|z| z.re)
        .collect()
}

/// Poses that put the three correspondences `indices` exactly on their rays.
///
/// Up to four poses are returned; solutions with a point behind the camera
/// are skipped.
pub(crate) fn solve_triplet<P: Parameters>(
    points_3d: &[NVec3],
    points_2d: &[NVec2],
    indices: [usize; 3],
    intrinsics: &Intrinsics,
) -> Vec<Pose> {
    let object = indices.map(|i| points_3d[i]);
    let bearings = indices.map(|i| bearing(&points_2d[i], intrinsics));

    // Side lengths opposite each vertex, and the cosines of the angles
    // between the bearings of the other two.
    let a2 = (object[1] - object[2]).magnitude_squared();
    let b2 = (object[0] - object[2]).magnitude_squared();
    let c2 = (object[0] - object[1]).magnitude_squared();
    if a2 <= 0. || b2 <= 0. || c2 <= 0. {
        return Vec::new();
    }
    let cos_a = bearings[1].dot(&bearings[2]);
    let cos_b = bearings[0].dot(&bearings[2]);
    let cos_c = bearings[0].dot(&bearings[1]);

    // With depths x, u x and v x, v = n(u) / d(u) and e(u) closes the system.
    let d = (b2 - a2) / c2;
    let e = b2 / c2;
    let n = [1. - d, 2. * d * cos_c, -(1. + d), 0., 0.];
    let den = [2. * cos_b, -2. * cos_a, 0., 0., 0.];
    let ep = [1. - e, 2. * e * cos_c, -e, 0., 0.];

    let nn = poly_mul(&n, &n);
    let nd = poly_mul(&n, &den);
    let edd = poly_mul(&ep, &poly_mul(&den, &den));
    let quartic: [Float; 5] = std::array::from_fn(|i| nn[i] - 2. * cos_b * nd[i] + edd[i]);

    let mut poses = Vec::new();
    for u in quartic_roots(&quartic) {
        let denominator = 2. * (cos_b - u * cos_a);
        let k = 1. + u * u - 2. * u * cos_c;
        if u <= 0. || denominator.abs() < 1e-12 || k < 1e-12 {
            continue;
        }
        let v = (n[0] + n[1] * u + n[2] * u * u) / denominator;
        if v <= 0. {
            continue;
        }

        let x = (c2 / k).sqrt();
        let camera = [bearings[0] * x, bearings[1] * (u * x), bearings[2] * (v * x)];
        let pose = Pose::align::<P>(&object, &camera);
        if pose.rotation.iter().all(|v| v.is_finite()) {
            poses.push(pose);
        }
    }
    poses
}
