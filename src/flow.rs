//! The contract for sparse optical-flow trackers that feed the solver.
//!
//! Tracking itself (pyramidal Lucas-Kanade or anything else) lives behind the
//! [`OpticalFlow`] trait. [`track_points()`] enforces the shape of the
//! exchange: luminance frames of equal size in, index-aligned point, status
//! and error arrays out, and no work at all for an empty point set.

use glam::Vec2;

use crate::Error;

/// A borrowed 8-bit luminance image with an explicit row stride.
#[derive(Clone, Copy, Debug)]
pub struct LumaView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a> LumaView<'a> {
    /// Wrap a raw pixel buffer.
    ///
    /// `stride` is the distance in bytes between the starts of two rows. The
    /// last row only needs `width` bytes.
    pub fn new(data: &'a [u8], width: usize, height: usize, stride: usize) -> Result<LumaView<'a>, Error> {
        let invalid = Error::InvalidImageBuffer {
            width,
            height,
            stride,
            len: data.len(),
        };
        if stride < width {
            return Err(invalid);
        }

        let required = match height {
            0 => Some(0),
            _ => stride
                .checked_mul(height - 1)
                .and_then(|n| n.checked_add(width)),
        };
        match required {
            Some(required) if required <= data.len() => Ok(LumaView {
                data,
                width,
                height,
                stride,
            }),
            _ => Err(invalid),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// The `width` pixels of row `y`.
    pub fn row(&self, y: usize) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.width)
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width {
            return None;
        }
        self.row(y).map(|row| row[x])
    }
}

/// Tracker settings.
///
/// These are policy for the tracker implementation, not part of the solver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowParams {
    /// Search window size in pixels at each pyramid level.
    pub window_size: (usize, usize),
    /// Index of the coarsest pyramid level; 0 tracks on the full image only.
    pub max_level: usize,
    pub max_iterations: usize,
    /// Stop iterating once an update moves a point less than this.
    pub epsilon: f32,
    /// Points whose spatial gradient matrix has a smaller minimum eigenvalue
    /// (normalised by window area) are reported as lost.
    pub min_eigen_threshold: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        FlowParams {
            window_size: (21, 21),
            max_level: 3,
            max_iterations: 30,
            epsilon: 0.01,
            min_eigen_threshold: 1e-4,
        }
    }
}

/// Tracker output, index-aligned with the tracked points.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackedPoints {
    pub points: Vec<Vec2>,
    /// Non-zero where the point was tracked successfully.
    pub status: Vec<u8>,
    /// Per-point tracking error.
    pub error: Vec<f32>,
}

impl TrackedPoints {
    fn seeded(points: &[Vec2]) -> TrackedPoints {
        TrackedPoints {
            points: points.to_vec(),
            status: vec![0; points.len()],
            error: vec![0.; points.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Indices and positions of the successfully tracked points.
    pub fn valid(&self) -> impl Iterator<Item = (usize, Vec2)> + '_ {
        self.points
            .iter()
            .zip(&self.status)
            .enumerate()
            .filter(|(_, (_, &status))| status != 0)
            .map(|(index, (&point, _))| (index, point))
    }
}

/// A sparse optical-flow tracker.
pub trait OpticalFlow {
    /// Track `points` from `previous` into `current`.
    ///
    /// `out` arrives holding a copy of `points`, all statuses 0 and all
    /// errors 0. Implementations update it in place and must keep its three
    /// arrays the same length as `points`.
    fn track(
        &mut self,
        previous: &LumaView<'_>,
        current: &LumaView<'_>,
        points: &[Vec2],
        params: &FlowParams,
        out: &mut TrackedPoints,
    );
}

/// Track `points` between two frames with `flow`.
///
/// An empty point set returns empty output without calling the tracker.
pub fn track_points<F: OpticalFlow + ?Sized>(
    flow: &mut F,
    previous: &LumaView<'_>,
    current: &LumaView<'_>,
    points: &[Vec2],
    params: &FlowParams,
) -> Result<TrackedPoints, Error> {
    if points.is_empty() {
        return Ok(TrackedPoints::default());
    }
    if previous.size() != current.size() {
        return Err(Error::ImageSizeMismatch {
            previous: previous.size(),
            current: current.size(),
        });
    }

    let mut out = TrackedPoints::seeded(points);
    flow.track(previous, current, points, params, &mut out);

    let shortest = out.points.len().min(out.status.len()).min(out.error.len());
    let longest = out.points.len().max(out.status.len()).max(out.error.len());
    if shortest != points.len() || longest != points.len() {
        return Err(Error::MisalignedTrack {
            expected: points.len(),
            actual: if shortest != points.len() { shortest } else { longest },
        });
    }

    Ok(out)
}
