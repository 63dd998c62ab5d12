//! Dense metric depth maps aligned to color images.
//!
//! Depth sensors such as the one used for ScanNet store depth as 16-bit integers in
//! millimeters, usually at a lower resolution than the color stream. This crate turns
//! such rasters into [`DepthMap`]s in meters (with `NaN` marking missing readings),
//! resizes them to the color resolution, and samples them at sub-pixel keypoint
//! locations with [`sample_depth`].

mod map;
mod reader;
mod sample;

pub use map::*;
pub use reader::*;
pub use sample::*;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read depth map {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("depth map {path:?} has unsupported pixel format {color:?}")]
    UnsupportedFormat {
        path: PathBuf,
        color: image::ColorType,
    },
    #[error("depth map of {width}x{height} needs {expected} values, got {actual}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("no depth map for image {0}")]
    Missing(String),
}

pub type Result<T> = std::result::Result<T, Error>;
