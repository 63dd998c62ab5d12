//! This crate plugs into `sfm-core` and provides the pinhole camera model used by
//! the reconstructions in this workspace. It converts pixels into normalized image
//! coordinates and back, projects world points into an image, and back-projects
//! pixels with a known depth into the world.

mod projection;

pub use projection::*;

use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use sfm_core::nalgebra::{Matrix3, Point2, Vector2};
use sfm_core::{CameraModel, CameraPoint, ImagePoint, KeyPoint};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A point in normalized image coordinates. This keypoint has been normalized
/// based on the camera intrinsic matrix, so it lies on the virtual image plane
/// at depth `1.0` in front of the camera.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct NormalizedKeyPoint(pub Point2<f64>);

impl NormalizedKeyPoint {
    /// Tries to convert the [`CameraPoint`] into a [`NormalizedKeyPoint`] by dividing
    /// by its depth.
    ///
    /// The depth is clipped from below at `eps`, so points on or behind the camera
    /// still produce a finite (if meaningless) keypoint.
    pub fn from_camera_point(point: CameraPoint, eps: f64) -> Self {
        let z = point.depth().max(eps);
        Self(Point2::new(point.x / z, point.y / z))
    }

    /// Conceptually appends a `1.0` component to the normalized keypoint to create
    /// a [`CameraPoint`] on the virtual image plane and then multiplies
    /// the point by `depth`. This `z`/`depth` component must be the depth of
    /// the keypoint in the direction the camera is pointing from the
    /// camera's optical center.
    pub fn with_depth(self, depth: f64) -> CameraPoint {
        CameraPoint((self.coords * depth).push(depth).into())
    }
}

/// This contains intrinsic camera parameters as per
/// [this Wikipedia page](https://en.wikipedia.org/wiki/Camera_resectioning#Intrinsic_parameters).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraIntrinsics {
    pub focals: Vector2<f64>,
    pub principal_point: Point2<f64>,
    pub skew: f64,
}

impl CameraIntrinsics {
    /// Creates camera intrinsics that would create an identity intrinsic matrix.
    pub fn identity() -> Self {
        Self {
            focals: Vector2::new(1.0, 1.0),
            skew: 0.0,
            principal_point: Point2::new(0.0, 0.0),
        }
    }

    /// Intrinsics of a COLMAP `PINHOLE` camera, whose parameters are `fx, fy, cx, cy`.
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self::identity()
            .focals(Vector2::new(fx, fy))
            .principal_point(Point2::new(cx, cy))
    }

    pub fn focals(self, focals: Vector2<f64>) -> Self {
        Self { focals, ..self }
    }

    pub fn principal_point(self, principal_point: Point2<f64>) -> Self {
        Self {
            principal_point,
            ..self
        }
    }

    #[rustfmt::skip]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focals.x,  self.skew,      self.principal_point.x,
            0.0,            self.focals.y,  self.principal_point.y,
            0.0,            0.0,            1.0,
        )
    }
}

impl CameraModel for CameraIntrinsics {
    type Projection = NormalizedKeyPoint;

    /// Converts a pixel into normalized image coordinates.
    ///
    /// ```
    /// use sfm_core::{KeyPoint, CameraModel};
    /// use sfm_pinhole::CameraIntrinsics;
    /// // The color camera of a ScanNet scene.
    /// let intrinsics = CameraIntrinsics::pinhole(1170.0, 1170.0, 647.75, 483.75);
    /// let nkp = intrinsics.calibrate(KeyPoint::new(764.75, 425.25));
    /// assert!((nkp.x - 0.1).abs() < 1e-12);
    /// assert!((nkp.y + 0.05).abs() < 1e-12);
    /// // The principal point lies on the optical axis.
    /// assert_eq!(intrinsics.calibrate(KeyPoint::new(647.75, 483.75)).0.coords.norm(), 0.0);
    /// ```
    fn calibrate<P>(&self, point: P) -> NormalizedKeyPoint
    where
        P: ImagePoint,
    {
        let centered = point.image_point() - self.principal_point;
        let y = centered.y / self.focals.y;
        let x = (centered.x - self.skew * y) / self.focals.x;
        NormalizedKeyPoint(Point2::new(x, y))
    }

    /// Converts a [`NormalizedKeyPoint`] back into pixel coordinates, which is the same
    /// as applying [`CameraIntrinsics::matrix`] to it.
    ///
    /// ```
    /// use sfm_core::{KeyPoint, CameraModel};
    /// use sfm_pinhole::{CameraIntrinsics, NormalizedKeyPoint};
    /// use sfm_core::nalgebra::Point2;
    /// let intrinsics = CameraIntrinsics::pinhole(577.87, 580.89, 319.5, 239.5);
    /// let nkp = NormalizedKeyPoint(Point2::new(-0.2, 0.3));
    /// let kp = intrinsics.uncalibrate(nkp);
    /// let homogeneous = intrinsics.matrix() * nkp.to_homogeneous();
    /// assert!((kp.to_homogeneous() - homogeneous).norm() < 1e-9);
    /// let back = intrinsics.calibrate(kp);
    /// assert!((back.0 - nkp.0).norm() < 1e-12);
    /// ```
    fn uncalibrate(&self, projection: NormalizedKeyPoint) -> KeyPoint {
        let y = projection.y * self.focals.y;
        let x = projection.x * self.focals.x + self.skew * projection.y;
        let centered = Point2::new(x, y);
        KeyPoint(centered + self.principal_point.coords)
    }
}
