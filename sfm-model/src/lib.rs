//! Reconstructions in the COLMAP data model and the operations this workspace runs on
//! them:
//!
//! * reading and writing the `cameras`, `images` and `points3D` tables ([`ColmapStore`]),
//! * building reference reconstructions for localization benchmarks, either by
//!   holding out query images from a full model or directly from ground-truth poses,
//! * correcting triangulated points with dense sensor depth
//!   ([`Reconstruction::correct_with_depth`]).

mod correction;
mod io;
mod model;
mod reference;
mod settings;

pub use correction::*;
pub use io::*;
pub use model::*;
pub use reference::*;
pub use settings::*;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed file {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("camera {camera} uses model {model}, which is not a pinhole model")]
    UnsupportedCameraModel { camera: CameraId, model: &'static str },
    #[error("camera {camera} of image {image} does not exist")]
    MissingCamera { image: String, camera: CameraId },
    #[error("image {0} does not exist")]
    MissingImage(ImageId),
    #[error("no usable depth map for image {image}: {source}")]
    Depth {
        image: String,
        #[source]
        source: sfm_depth::Error,
    },
    #[error("image {image} keeps {slots} associated points but {points} were back-projected")]
    AssociationMismatch {
        image: String,
        slots: usize,
        points: usize,
    },
    #[error("refusing to overwrite the input reconstruction {0:?}")]
    OutputIsInput(PathBuf),
    #[error("invalid correction settings: {0}")]
    InvalidSettings(String),
    #[error("reconstruction is inconsistent ({count} violations), first: {first}")]
    Inconsistent { count: usize, first: String },
}

pub type Result<T> = std::result::Result<T, Error>;
