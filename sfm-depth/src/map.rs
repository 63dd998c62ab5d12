use crate::{Error, Result};
use derive_more::{Deref, DerefMut};
use image::{ImageBuffer, Luma};
use sfm_pinhole::ImageSize;

type DepthImageBuffer = ImageBuffer<Luma<f64>, Vec<f64>>;

/// Depth readings above this many meters are treated as sensor garbage.
pub const MAX_DEPTH_METERS: f64 = 1000.0;

/// Converts a raw sensor reading in millimeters to meters.
///
/// A reading of zero means the sensor got no return, and anything beyond
/// [`MAX_DEPTH_METERS`] is out of range. Both become `NaN`.
///
/// ```
/// use sfm_depth::millimeters_to_meters;
/// assert_eq!(millimeters_to_meters(500.0), 0.5);
/// assert!(millimeters_to_meters(0.0).is_nan());
/// assert!(millimeters_to_meters(1_000_001.0).is_nan());
/// ```
pub fn millimeters_to_meters(raw: f64) -> f64 {
    let meters = raw / 1000.0;
    if meters == 0.0 || meters > MAX_DEPTH_METERS {
        f64::NAN
    } else {
        meters
    }
}

/// A metric depth map in meters. Missing readings are `NaN`.
///
/// This is a thin wrapper around the image crate's buffer so that depth maps can be
/// indexed and iterated like any other image.
#[derive(Debug, Clone, PartialEq, Deref, DerefMut)]
pub struct DepthMap(pub DepthImageBuffer);

impl DepthMap {
    /// Creates a depth map from row-major values in meters.
    pub fn from_meters(width: u32, height: u32, meters: Vec<f64>) -> Result<Self> {
        let actual = meters.len();
        ImageBuffer::from_raw(width, height, meters)
            .map(Self)
            .ok_or(Error::DimensionMismatch {
                width,
                height,
                expected: width as usize * height as usize,
                actual,
            })
    }

    /// Creates a depth map from row-major raw readings in millimeters, applying
    /// [`millimeters_to_meters`] to every value.
    pub fn from_millimeters(
        width: u32,
        height: u32,
        millimeters: impl IntoIterator<Item = f64>,
    ) -> Result<Self> {
        Self::from_meters(
            width,
            height,
            millimeters.into_iter().map(millimeters_to_meters).collect(),
        )
    }

    /// Creates a depth map by calling `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f64) -> Self {
        Self(ImageBuffer::from_fn(width, height, |x, y| Luma([f(x, y)])))
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width(), self.height())
    }

    /// The depth at an integer pixel, or `None` outside the map.
    pub fn depth(&self, x: i64, y: i64) -> Option<f64> {
        if x < 0 || y < 0 || x >= i64::from(self.width()) || y >= i64::from(self.height()) {
            None
        } else {
            Some(self.get_pixel(x as u32, y as u32)[0])
        }
    }

    /// The number of pixels holding a usable depth.
    pub fn num_valid(&self) -> usize {
        self.pixels().filter(|p| !p[0].is_nan()).count()
    }

    /// Resizes the map with bilinear interpolation, treating pixels as areas
    /// (the `align_corners = false` convention).
    ///
    /// The source coordinate of output pixel `d` is `max((d + 0.5) * in / out - 0.5, 0)`.
    /// A `NaN` neighbour poisons every output pixel it contributes to, so holes grow
    /// rather than being smeared over. Resizing to the current size returns a copy.
    pub fn resize_bilinear(&self, size: ImageSize) -> Self {
        if size == self.size() {
            return self.clone();
        }
        let rows = axis_weights(self.height(), size.height);
        let columns = axis_weights(self.width(), size.width);
        Self::from_fn(size.width, size.height, |x, y| {
            let (y0, y1, ly0, ly1) = rows[y as usize];
            let (x0, x1, lx0, lx1) = columns[x as usize];
            let at = |x: u32, y: u32| self.get_pixel(x, y)[0];
            ly0 * (lx0 * at(x0, y0) + lx1 * at(x1, y0)) + ly1 * (lx0 * at(x0, y1) + lx1 * at(x1, y1))
        })
    }
}

/// For every output index along one axis, the two source indices and their weights.
fn axis_weights(input: u32, output: u32) -> Vec<(u32, u32, f64, f64)> {
    let scale = f64::from(input) / f64::from(output);
    (0..output)
        .map(|dst| {
            let src = (scale * (f64::from(dst) + 0.5) - 0.5).max(0.0);
            let lower = (src.floor() as u32).min(input - 1);
            let upper = if lower < input - 1 { lower + 1 } else { lower };
            let upper_weight = src - f64::from(lower);
            (lower, upper, 1.0 - upper_weight, upper_weight)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn millimeter_validity() {
        let map = DepthMap::from_millimeters(3, 1, [0.0, 500.0, 1_000_001.0]).unwrap();
        assert!(map.depth(0, 0).unwrap().is_nan());
        assert_eq!(map.depth(1, 0), Some(0.5));
        assert!(map.depth(2, 0).unwrap().is_nan());
        assert_eq!(map.num_valid(), 1);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(matches!(
            DepthMap::from_meters(2, 2, vec![1.0; 3]),
            Err(Error::DimensionMismatch {
                expected: 4,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn out_of_bounds_pixel() {
        let map = DepthMap::from_fn(2, 2, |_, _| 1.0);
        assert_eq!(map.depth(-1, 0), None);
        assert_eq!(map.depth(0, 2), None);
        assert_eq!(map.depth(1, 1), Some(1.0));
    }

    #[test]
    fn resize_same_size_is_a_copy() {
        let map = DepthMap::from_fn(3, 2, |x, y| if x == 1 { f64::NAN } else { f64::from(y) });
        let resized = map.resize_bilinear(map.size());
        assert_eq!(resized.num_valid(), 4);
        assert_eq!(resized.depth(0, 1), Some(1.0));
    }

    #[test]
    fn upsample_constant_stays_constant() {
        let map = DepthMap::from_fn(4, 3, |_, _| 2.5);
        let resized = map.resize_bilinear(ImageSize::new(8, 6));
        assert_eq!(resized.size(), ImageSize::new(8, 6));
        for p in resized.pixels() {
            assert_relative_eq!(p[0], 2.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn upsample_linear_ramp() {
        // A ramp along x: value = x. Doubling maps output x to source (x + 0.5) / 2 - 0.5.
        let map = DepthMap::from_fn(4, 1, |x, _| f64::from(x));
        let resized = map.resize_bilinear(ImageSize::new(8, 1));
        let expected = [0.0, 0.25, 0.75, 1.25, 1.75, 2.25, 2.75, 3.0];
        for (x, &e) in expected.iter().enumerate() {
            assert_relative_eq!(resized.depth(x as i64, 0).unwrap(), e, epsilon = 1e-12);
        }
    }

    #[test]
    fn nan_poisons_neighbours_when_resizing() {
        let map = DepthMap::from_fn(4, 1, |x, _| if x == 2 { f64::NAN } else { 1.0 });
        let resized = map.resize_bilinear(ImageSize::new(8, 1));
        let valid: Vec<bool> = (0..8)
            .map(|x| !resized.depth(x, 0).unwrap().is_nan())
            .collect();
        // Output pixels 3..=6 read source pixel 2.
        assert_eq!(
            valid,
            vec![true, true, true, false, false, false, false, true]
        );
    }
}
