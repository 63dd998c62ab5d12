use crate::DepthMap;
use sfm_core::KeyPoint;
use sfm_pinhole::ImageSize;

/// Depths sampled at a batch of keypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSamples {
    /// One depth per keypoint, `NaN` where no depth could be recovered.
    pub depths: Vec<f64>,
    /// `true` where the corresponding depth is usable.
    pub valid: Vec<bool>,
}

impl DepthSamples {
    /// The depths of the valid samples, in order.
    pub fn valid_depths(&self) -> Vec<f64> {
        self.depths
            .iter()
            .zip(&self.valid)
            .filter(|&(_, &valid)| valid)
            .map(|(&depth, _)| depth)
            .collect()
    }
}

/// Samples `depth` at sub-pixel `keypoints` of an image of the given `size`.
///
/// The map is first resized to `size` (see [`DepthMap::resize_bilinear`]). Each keypoint
/// is then sampled bilinearly, which fails whenever any of its four neighbours is
/// missing, and by nearest neighbour, which only fails when the single closest pixel is
/// missing. The bilinear value wins wherever it exists and the nearest value fills in the
/// rest, so the valid set is as large as possible while staying smooth where it can.
///
/// Every keypoint must be strictly inside the image; this is what the `pad` of
/// [`sfm_pinhole::project_to_image`] guarantees. Panics otherwise.
pub fn sample_depth(depth: &DepthMap, keypoints: &[KeyPoint], size: ImageSize) -> DepthSamples {
    let depth = depth.resize_bilinear(size);
    let (depths, valid): (Vec<f64>, Vec<bool>) = keypoints
        .iter()
        .map(|&keypoint| {
            let (x, y) = grid_coordinates(keypoint, size);
            let linear = sample_bilinear(&depth, x, y);
            let merged = if linear.is_nan() {
                sample_nearest(&depth, x, y)
            } else {
                linear
            };
            (merged, !merged.is_nan())
        })
        .unzip();
    DepthSamples { depths, valid }
}

/// Sends a keypoint through the normalized `[-1, 1]` sampling domain and back into
/// pixel units of the resized map, with the corners of the domain on the corner pixel
/// centers.
fn grid_coordinates(keypoint: KeyPoint, size: ImageSize) -> (f64, f64) {
    let max_x = f64::from(size.width) - 1.0;
    let max_y = f64::from(size.height) - 1.0;
    let nx = keypoint.x / max_x * 2.0 - 1.0;
    let ny = keypoint.y / max_y * 2.0 - 1.0;
    assert!(
        nx > -1.0 && nx < 1.0 && ny > -1.0 && ny < 1.0,
        "keypoint ({}, {}) is not strictly inside a {}x{} image",
        keypoint.x,
        keypoint.y,
        size.width,
        size.height
    );
    ((nx + 1.0) / 2.0 * max_x, (ny + 1.0) / 2.0 * max_y)
}

/// Bilinear interpolation where neighbours outside the map contribute nothing and a
/// `NaN` neighbour inside the map makes the result `NaN`, even at zero weight.
pub fn sample_bilinear(depth: &DepthMap, x: f64, y: f64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let (x1, y1) = (x0 + 1.0, y0 + 1.0);
    [
        (x0, y0, (x1 - x) * (y1 - y)),
        (x1, y0, (x - x0) * (y1 - y)),
        (x0, y1, (x1 - x) * (y - y0)),
        (x1, y1, (x - x0) * (y - y0)),
    ]
    .iter()
    .filter_map(|&(cx, cy, weight)| depth.depth(cx as i64, cy as i64).map(|d| d * weight))
    .sum()
}

/// Nearest neighbour lookup with ties rounded to even; `0.0` outside the map.
pub fn sample_nearest(depth: &DepthMap, x: f64, y: f64) -> f64 {
    depth
        .depth(x.round_ties_even() as i64, y.round_ties_even() as i64)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane() -> DepthMap {
        DepthMap::from_fn(5, 4, |x, y| 1.0 + 0.1 * f64::from(x) + 0.01 * f64::from(y))
    }

    #[test]
    fn bilinear_on_a_plane_is_exact() {
        let samples = sample_depth(&plane(), &[KeyPoint::new(1.25, 2.5)], ImageSize::new(5, 4));
        assert_eq!(samples.valid, vec![true]);
        assert_relative_eq!(samples.depths[0], 1.0 + 0.125 + 0.025, epsilon = 1e-12);
    }

    #[test]
    fn nearest_fills_bilinear_holes() {
        // The hole at (2, 1) poisons bilinear samples around it, but the keypoint is
        // closest to (1, 1), which is valid.
        let map = DepthMap::from_fn(5, 4, |x, y| if (x, y) == (2, 1) { f64::NAN } else { 3.0 });
        let samples = sample_depth(&map, &[KeyPoint::new(1.2, 1.3)], ImageSize::new(5, 4));
        assert_eq!(samples.valid, vec![true]);
        assert_eq!(samples.depths[0], 3.0);
    }

    #[test]
    fn invalid_when_nearest_is_missing() {
        let map = DepthMap::from_fn(5, 4, |x, y| if (x, y) == (2, 1) { f64::NAN } else { 3.0 });
        let samples = sample_depth(&map, &[KeyPoint::new(1.8, 1.3)], ImageSize::new(5, 4));
        assert_eq!(samples.valid, vec![false]);
        assert!(samples.depths[0].is_nan());
        assert!(samples.valid_depths().is_empty());
    }

    #[test]
    fn nan_neighbour_poisons_bilinear_at_zero_weight() {
        let map = DepthMap::from_fn(3, 3, |x, _| if x == 2 { f64::NAN } else { 1.0 });
        assert!(sample_bilinear(&map, 1.0, 1.0).is_nan());
        assert_eq!(sample_nearest(&map, 1.0, 1.0), 1.0);
    }

    #[test]
    fn nearest_rounds_half_to_even() {
        let map = DepthMap::from_fn(4, 1, |x, _| f64::from(x));
        assert_eq!(sample_nearest(&map, 1.5, 0.0), 2.0);
        assert_eq!(sample_nearest(&map, 2.5, 0.0), 2.0);
    }

    #[test]
    fn samples_resized_map() {
        // A 2x2 map of ones sampled for a 6x4 image.
        let map = DepthMap::from_fn(2, 2, |_, _| 1.0);
        let samples = sample_depth(
            &map,
            &[KeyPoint::new(1.0, 1.0), KeyPoint::new(4.5, 2.5)],
            ImageSize::new(6, 4),
        );
        assert_eq!(samples.valid, vec![true, true]);
        for &d in &samples.depths {
            assert_relative_eq!(d, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    #[should_panic]
    fn keypoint_on_border_panics() {
        sample_depth(&plane(), &[KeyPoint::new(0.0, 1.0)], ImageSize::new(5, 4));
    }
}
