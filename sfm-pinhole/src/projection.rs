use crate::{CameraIntrinsics, NormalizedKeyPoint};
use sfm_core::{CameraModel, KeyPoint, Pose, WorldPoint, WorldToCamera};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Checks that the keypoint lies within `[pad, width - pad - 1] x [pad, height - pad - 1]`.
    ///
    /// Both ends of the interval are inclusive.
    pub fn contains_padded(&self, keypoint: KeyPoint, pad: u32) -> bool {
        let pad = f64::from(pad);
        let max_x = f64::from(self.width) - pad - 1.0;
        let max_y = f64::from(self.height) - pad - 1.0;
        keypoint.x >= pad && keypoint.x <= max_x && keypoint.y >= pad && keypoint.y <= max_y
    }
}

/// The result of projecting a batch of world points into an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// The pixel coordinates of the points that passed both the depth and bounds
    /// test, in their original order.
    pub keypoints: Vec<KeyPoint>,
    /// One flag per input point; `true` for the points present in `keypoints`.
    pub valid: Vec<bool>,
}

impl Projection {
    /// The number of points that projected into the image.
    pub fn num_valid(&self) -> usize {
        self.keypoints.len()
    }
}

/// Projects world points into the pixel frame of a camera.
///
/// A point is kept when its depth in the camera frame is strictly greater than `eps`
/// and its pixel coordinate lies inside the image shrunk by `pad` pixels on every
/// side. The margin keeps later interpolation away from the image border.
///
/// ```
/// use sfm_core::{Pose, WorldPoint, WorldToCamera};
/// use sfm_core::nalgebra::Point3;
/// use sfm_pinhole::{project_to_image, CameraIntrinsics, ImageSize};
/// let intrinsics = CameraIntrinsics::pinhole(100.0, 100.0, 50.0, 40.0);
/// let points = [
///     WorldPoint(Point3::new(0.0, 0.0, 2.0)),
///     WorldPoint(Point3::new(0.0, 0.0, -2.0)),
///     WorldPoint(Point3::new(5.0, 0.0, 1.0)),
/// ];
/// let projection = project_to_image(
///     &points,
///     WorldToCamera::identity(),
///     &intrinsics,
///     ImageSize::new(100, 80),
///     1e-4,
///     1,
/// );
/// assert_eq!(projection.valid, vec![true, false, false]);
/// assert_eq!(projection.keypoints[0].x, 50.0);
/// ```
pub fn project_to_image(
    points: &[WorldPoint],
    pose: WorldToCamera,
    intrinsics: &CameraIntrinsics,
    size: ImageSize,
    eps: f64,
    pad: u32,
) -> Projection {
    let mut keypoints = Vec::with_capacity(points.len());
    let valid = points
        .iter()
        .map(|&world| {
            let camera = pose.transform(world);
            let visible = camera.depth() > eps;
            let keypoint = intrinsics.uncalibrate(NormalizedKeyPoint::from_camera_point(camera, eps));
            let valid = visible && size.contains_padded(keypoint, pad);
            if valid {
                keypoints.push(keypoint);
            }
            valid
        })
        .collect();
    Projection { keypoints, valid }
}

/// Converts pixels with a known depth back into world points.
///
/// Each pixel is unprojected onto the virtual image plane with the inverse intrinsics,
/// scaled by its depth, and moved into the world with the inverse of `pose`.
///
/// Panics if `keypoints` and `depths` have different lengths.
///
/// ```
/// use sfm_core::{Pose, WorldPoint, WorldToCamera};
/// use sfm_core::nalgebra::{Point3, Rotation3, Vector3};
/// use sfm_pinhole::{back_project, project_to_image, CameraIntrinsics, ImageSize};
/// let intrinsics = CameraIntrinsics::pinhole(500.0, 480.0, 320.0, 240.0);
/// let pose = WorldToCamera::from_parts(
///     Vector3::new(0.1, -0.2, 0.3),
///     Rotation3::from_euler_angles(0.05, 0.1, -0.02),
/// );
/// let world = WorldPoint(Point3::new(0.2, 0.1, 3.0));
/// let depth = pose.transform(world).depth();
/// let projection = project_to_image(&[world], pose, &intrinsics, ImageSize::new(640, 480), 1e-4, 1);
/// let back = back_project(&projection.keypoints, pose, &[depth], &intrinsics);
/// assert!((back[0].0 - world.0).norm() < 1e-9);
/// ```
pub fn back_project(
    keypoints: &[KeyPoint],
    pose: WorldToCamera,
    depths: &[f64],
    intrinsics: &CameraIntrinsics,
) -> Vec<WorldPoint> {
    assert_eq!(
        keypoints.len(),
        depths.len(),
        "every keypoint needs exactly one depth"
    );
    let camera_to_world = pose.inverse();
    keypoints
        .iter()
        .zip(depths)
        .map(|(&keypoint, &depth)| {
            camera_to_world.transform(intrinsics.calibrate(keypoint).with_depth(depth))
        })
        .collect()
}
