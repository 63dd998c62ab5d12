use derive_more::{AsMut, AsRef, Deref, DerefMut, From, Into};
use nalgebra::Point3;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A 3d point relative to the camera's optical center and orientation where
/// the positive X axis is right, positive Y axis is down, and positive Z axis is forwards
/// from the optical center of the camera.
///
/// The `z` component is the depth of the point, which is what a depth sensor measures.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraPoint(pub Point3<f64>);

impl CameraPoint {
    /// The distance of the point along the optical axis.
    pub fn depth(&self) -> f64 {
        self.0.z
    }
}

/// A point in "world" coordinates.
///
/// For reconstructions seeded from ground-truth poses the unit of distance is
/// the unit of the poses (meters for ScanNet and Hypersim). For reconstructions
/// produced purely from images the scale is arbitrary.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, AsMut, AsRef, Deref, DerefMut, From, Into)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WorldPoint(pub Point3<f64>);
