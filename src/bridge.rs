//! Primitive-only boundary for callers on the other side of an FFI.
//!
//! Object points arrive as flat `[x, y, z, x, y, z, ...]` arrays and image
//! points as flat `[u, v, u, v, ...]` arrays. Poses leave as plain scalars.

use glam::{Vec2, Vec3};

use crate::{solve, EPnPResult, Error, Float, Intrinsics};

/// A solved pose in plain scalars.
///
/// `rotation` is row-major. `success` is 1 for a usable pose and 0 otherwise.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawPose {
    pub rotation: [f32; 9],
    pub translation: [f32; 3],
    pub rms_error: f32,
    pub success: u8,
}

impl RawPose {
    pub fn failed() -> RawPose {
        RawPose::from(&EPnPResult::failed(Error::NumericDivergence))
    }
}

impl From<&EPnPResult> for RawPose {
    fn from(result: &EPnPResult) -> Self {
        let r = result.rotation();
        let t = result.translation();
        RawPose {
            rotation: std::array::from_fn(|i| r[i / 3][i % 3] as f32),
            translation: t.map(|v| v as f32),
            rms_error: narrow(result.rms_error()),
            success: result.success() as u8,
        }
    }
}

fn narrow(v: Float) -> f32 {
    if v.is_nan() {
        f32::NAN
    } else {
        v.clamp(f32::MIN as Float, f32::MAX as Float) as f32
    }
}

fn unpack(points_3d: &[f32], points_2d: &[f32], count: usize) -> Result<(Vec<Vec3>, Vec<Vec2>), Error> {
    if points_3d.len() < 3 * count || points_2d.len() < 2 * count {
        return Err(Error::UnexpectedCount {
            expected: count,
            actual: (points_3d.len() / 3).min(points_2d.len() / 2),
        });
    }

    let world = points_3d
        .chunks_exact(3)
        .take(count)
        .map(Vec3::from_slice)
        .collect();
    let image = points_2d
        .chunks_exact(2)
        .take(count)
        .map(Vec2::from_slice)
        .collect();
    Ok((world, image))
}

/// Solve from flat arrays holding `count` correspondences.
///
/// `intrinsics` is `[fx, fy, cx, cy]`.
pub fn solve_flat(points_3d: &[f32], points_2d: &[f32], count: usize, intrinsics: [f32; 4]) -> RawPose {
    let [fx, fy, cx, cy] = intrinsics.map(Float::from);
    let result = match unpack(points_3d, points_2d, count) {
        Ok((world, image)) => solve(&world, &image, &Intrinsics::new(fx, fy, cx, cy)),
        Err(error) => EPnPResult::failed(error),
    };
    RawPose::from(&result)
}

/// Rotation-vector flavour of [`solve_flat`].
///
/// Writes the axis-angle rotation and the translation and returns the RMS
/// reprojection error, or -1 if the solve failed (the outputs are then left
/// untouched).
pub fn solve_flat_rvec(
    points_3d: &[f32],
    points_2d: &[f32],
    count: usize,
    intrinsics: [f32; 4],
    rvec_out: &mut [f32; 3],
    tvec_out: &mut [f32; 3],
) -> f32 {
    let [fx, fy, cx, cy] = intrinsics.map(Float::from);
    let result = match unpack(points_3d, points_2d, count) {
        Ok((world, image)) => solve(&world, &image, &Intrinsics::new(fx, fy, cx, cy)),
        Err(error) => EPnPResult::failed(error),
    };
    if !result.success() {
        return -1.;
    }

    *rvec_out = result.rotation_vector().map(|v| v as f32);
    *tvec_out = result.translation().map(|v| v as f32);
    narrow(result.rms_error())
}

/// C entry point for [`solve_flat`].
///
/// Returns the success flag that is also written to `out`.
///
/// # Safety
///
/// `points_3d` must point to `3 * count` floats, `points_2d` to `2 * count`
/// floats and `out` to writable memory for one [`RawPose`]. Null pointers
/// and negative counts are reported as a failed solve.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn epnp_solve(
    points_3d: *const f32,
    points_2d: *const f32,
    count: i32,
    fx: f32,
    fy: f32,
    cx: f32,
    cy: f32,
    out: *mut RawPose,
) -> u8 {
    if out.is_null() {
        return 0;
    }

    let pose = match usize::try_from(count) {
        Ok(count) if !points_3d.is_null() && !points_2d.is_null() => {
            let world = std::slice::from_raw_parts(points_3d, 3 * count);
            let image = std::slice::from_raw_parts(points_2d, 2 * count);
            solve_flat(world, image, count, [fx, fy, cx, cy])
        }
        _ => RawPose::failed(),
    };

    out.write(pose);
    pose.success
}
