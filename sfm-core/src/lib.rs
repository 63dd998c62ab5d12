//! # SfM Core
//!
//! Common geometric types for working with structure-from-motion reconstructions
//! whose cameras are posed with known intrinsics. All the crates in this workspace
//! that speak about points, poses or pixels depend on this crate so that they can
//! exchange data without conversions.
//!
//! ## Coordinate frames
//!
//! Three frames show up everywhere:
//!
//! * **World**: the frame of the reconstruction, in meters when the poses come
//!   from a calibrated sensor (ScanNet, Hypersim).
//! * **Camera**: origin at the optical center, `+x` right, `+y` down, `+z` forward.
//! * **Image**: pixel coordinates, `+x` right, `+y` down, origin at the top-left
//!   pixel center.
//!
//! A [`WorldToCamera`] pose maps a [`WorldPoint`] into a [`CameraPoint`]:
//!
//! ```text
//! p_cam = R * p_world + t
//! ```
//!
//! which is the convention used by COLMAP for the `qvec`/`tvec` of an image.
//! The inverse pose, [`CameraToWorld`], is what is needed to back-project a pixel
//! with a known depth into the world.

mod camera;
mod keypoint;
mod point;
mod pose;

pub use camera::*;
pub use keypoint::*;
pub use nalgebra;
pub use point::*;
pub use pose::*;
