use crate::{ImagePoint, KeyPoint};

/// Allows conversion between the point on an image and the internal projection
/// which describes the ray out of the camera that hit that pixel.
pub trait CameraModel {
    /// The calibrated representation of an image point.
    type Projection;

    /// Extracts the calibrated projection from a pixel location in an image.
    ///
    /// The image point X axis points right and its Y axis points down.
    fn calibrate<P>(&self, point: P) -> Self::Projection
    where
        P: ImagePoint;

    /// Extracts the pixel location in the image from the calibrated projection.
    fn uncalibrate(&self, projection: Self::Projection) -> KeyPoint;
}
