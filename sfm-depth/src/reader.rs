use crate::{DepthMap, Error, Result};
use image::DynamicImage;
use log::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Supplies the depth map that belongs to an image of a reconstruction.
pub trait DepthReader {
    /// Reads the depth map (in meters) for the image with the given name.
    fn read(&self, image_name: &str) -> Result<DepthMap>;
}

impl DepthReader for HashMap<String, DepthMap> {
    fn read(&self, image_name: &str) -> Result<DepthMap> {
        self.get(image_name)
            .cloned()
            .ok_or_else(|| Error::Missing(image_name.to_owned()))
    }
}

/// Reads depth maps stored as grayscale PNG files in millimeters, one per color image,
/// from a single folder.
#[derive(Debug, Clone)]
pub struct PngDepthReader {
    folder: PathBuf,
    extension: String,
}

impl PngDepthReader {
    /// Depth maps are looked up in `folder` under the image name with its `jpg` extension
    /// replaced by `png`.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            extension: "png".to_owned(),
        }
    }

    /// Replace the `jpg` extension by `extension` instead of `png`.
    pub fn extension(self, extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            ..self
        }
    }

    /// The path of the depth map for `image_name`.
    pub fn depth_path(&self, image_name: &str) -> PathBuf {
        self.folder.join(depth_name(image_name, &self.extension))
    }
}

impl DepthReader for PngDepthReader {
    fn read(&self, image_name: &str) -> Result<DepthMap> {
        read_millimeter_png(self.depth_path(image_name))
    }
}

/// Maps a color image name to the name of its depth map by swapping a `jpg`
/// extension for `extension`. Names with any other extension are kept as they are.
///
/// ```
/// assert_eq!(sfm_depth::depth_name("color/12.jpg", "png"), std::path::PathBuf::from("color/12.png"));
/// assert_eq!(sfm_depth::depth_name("12.png", "png"), std::path::PathBuf::from("12.png"));
/// ```
pub fn depth_name(image_name: &str, extension: &str) -> PathBuf {
    let path = Path::new(image_name);
    match path.extension() {
        Some(ext) if ext == "jpg" => path.with_extension(extension),
        _ => path.to_path_buf(),
    }
}

/// Reads a single-channel PNG of raw millimeter readings into a [`DepthMap`] in meters.
pub fn read_millimeter_png(path: impl AsRef<Path>) -> Result<DepthMap> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|source| Error::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let (width, height) = (image.width(), image.height());
    let map = match image {
        DynamicImage::ImageLuma16(raw) => DepthMap::from_millimeters(
            width,
            height,
            raw.into_raw().into_iter().map(f64::from),
        )?,
        DynamicImage::ImageLuma8(raw) => DepthMap::from_millimeters(
            width,
            height,
            raw.into_raw().into_iter().map(f64::from),
        )?,
        other => {
            return Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                color: other.color(),
            })
        }
    };
    debug!(
        "loaded {}x{} depth map {:?} with {} valid pixels",
        width,
        height,
        path,
        map.num_valid()
    );
    Ok(map)
}
