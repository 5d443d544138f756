use thiserror::Error;

use crate::Float;

/// Everything that can stop a solve, or stop data from reaching one.
///
/// Setters return these directly. [`crate::Solver::compute()`] never fails
/// outright; instead it attaches the error to an unsuccessful
/// [`crate::EPnPResult`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// Fewer than the minimum number of correspondences were supplied.
    #[error("EPnP requires at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences.
        required: usize,
        /// Number of correspondences supplied.
        actual: usize,
    },

    /// World and image point sequences are not index-aligned.
    #[error("mismatched correspondences: {world} world points, {image} image points")]
    MismatchedCorrespondences {
        /// Number of world points.
        world: usize,
        /// Number of image points.
        image: usize,
    },

    /// The correspondence count differs from the one the solver was built for.
    #[error("solver expects {expected} correspondences, got {actual}")]
    UnexpectedCount {
        /// Count given at construction.
        expected: usize,
        /// Count supplied.
        actual: usize,
    },

    /// Focal lengths are zero or a parameter is not finite.
    #[error("invalid camera intrinsics")]
    InvalidIntrinsics,

    /// The world points are coplanar, collinear or coincident.
    #[error("degenerate point configuration: {0}")]
    DegenerateGeometry(&'static str),

    /// Every pose candidate produced a non-finite or exploding error, or came
    /// out as the mirror image of the object.
    #[error("all pose candidates diverged")]
    NumericDivergence,

    /// The selected rotation is not orthonormal within tolerance.
    #[error("rotation failed the orthonormality check (error {0:e})")]
    OrthonormalityViolation(Float),

    /// A pixel buffer is too small for its declared geometry.
    #[error("invalid image buffer: {width}x{height} with stride {stride} does not fit in {len} bytes")]
    InvalidImageBuffer {
        /// Width in pixels.
        width: usize,
        /// Height in pixels.
        height: usize,
        /// Row stride in bytes.
        stride: usize,
        /// Length of the supplied buffer.
        len: usize,
    },

    /// Two frames handed to the tracker differ in size.
    #[error("image size mismatch: {previous:?} != {current:?}")]
    ImageSizeMismatch {
        /// Width and height of the previous frame.
        previous: (usize, usize),
        /// Width and height of the current frame.
        current: (usize, usize),
    },

    /// A tracker returned arrays that are not aligned with its input.
    #[error("tracker returned {actual} entries for {expected} points")]
    MisalignedTrack {
        /// Number of input points.
        expected: usize,
        /// Length of the first output array that disagrees.
        actual: usize,
    },
}
