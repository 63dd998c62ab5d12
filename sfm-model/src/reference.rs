use crate::{Camera, Error, Image, ImageId, Reconstruction, ReconstructionStore, Result};
use log::*;
use sfm_core::nalgebra::Matrix4;
use sfm_core::{CameraToWorld, Pose, WorldToCamera};
use sfm_pinhole::ImageSize;
use std::collections::HashSet;
use std::path::Path;

/// Which images of a model serve as the database and which are held out as queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<ImageId>,
    pub test: Vec<ImageId>,
}

/// Reads a newline separated list of image names.
///
/// Trailing whitespace on each line is ignored, as are blank lines.
pub fn read_blacklist(path: &Path) -> Result<HashSet<String>> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Splits the images into queries (named in `blacklist`) and database images (all others).
///
/// Both lists are in ascending id order.
pub fn train_test_ids(reconstruction: &Reconstruction, blacklist: Option<&HashSet<String>>) -> TrainTestSplit {
    let mut split = TrainTestSplit::default();
    for image in reconstruction.images.values() {
        if blacklist.map_or(false, |blacklist| blacklist.contains(&image.name)) {
            split.test.push(image.id);
        } else {
            split.train.push(image.id);
        }
    }
    split
}

impl Reconstruction {
    /// A copy holding only the images in `keep`.
    ///
    /// Tracks lose their observations from the other images, and points that end up
    /// with an empty track are dropped. Cameras are kept as they are.
    pub fn retain_images(&self, keep: &HashSet<ImageId>) -> Reconstruction {
        let mut filtered = Reconstruction {
            cameras: self.cameras.clone(),
            ..Reconstruction::default()
        };
        for image in self.images.values().filter(|image| keep.contains(&image.id)) {
            filtered.add_image(image.clone());
        }
        for point in self.points3d.values() {
            let track: Vec<_> = point
                .track
                .iter()
                .copied()
                .filter(|element| keep.contains(&element.image_id))
                .collect();
            if !track.is_empty() {
                let mut point = point.clone();
                point.track = track;
                filtered.add_point3d(point);
            }
        }
        filtered
    }
}

/// Builds the reference (database) model by removing every image named in `blacklist`.
pub fn create_reference_sfm(
    full: &Reconstruction,
    blacklist: Option<&HashSet<String>>,
) -> (Reconstruction, TrainTestSplit) {
    info!("creating the reference model");
    let split = train_test_ids(full, blacklist);
    let reference = full.retain_images(&split.train.iter().copied().collect());
    info!(
        "kept {} images out of {}",
        reference.images.len(),
        full.images.len()
    );
    (reference, split)
}

/// Reads `full_model`, writes its reference model to `ref_model` and returns the split.
pub fn create_reference_sfm_from_store(
    store: &impl ReconstructionStore,
    full_model: &Path,
    ref_model: &Path,
    blacklist: Option<&Path>,
) -> Result<TrainTestSplit> {
    let full = store.read(full_model)?;
    let blacklist = blacklist.map(read_blacklist).transpose()?;
    let (reference, split) = create_reference_sfm(&full, blacklist.as_ref());
    store.write(&reference, ref_model)?;
    Ok(split)
}

/// A model without any points, made only of known poses.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseReference {
    pub reconstruction: Reconstruction,
    /// How many views were dropped because their pose was unknown.
    pub missing_poses: usize,
}

/// Builds a model with one `camera` shared by all `views`.
///
/// Views without a pose are counted and left out.
pub fn reconstruction_from_poses(
    camera: Camera,
    views: impl IntoIterator<Item = (ImageId, String, Option<WorldToCamera>)>,
) -> PoseReference {
    let camera_id = camera.id;
    let mut reconstruction = Reconstruction::new();
    reconstruction.add_camera(camera);
    let mut missing_poses = 0;
    for (id, name, pose) in views {
        match pose {
            Some(pose) => reconstruction.add_image(Image::new(id, name, camera_id, pose)),
            None => missing_poses += 1,
        }
    }
    warn!("{} images have no pose", missing_poses);
    PoseReference {
        reconstruction,
        missing_poses,
    }
}

/// Resolution of the ScanNet color stream.
pub const SCANNET_COLOR_SIZE: ImageSize = ImageSize {
    width: 1296,
    height: 968,
};

/// Reads a whitespace separated 4x4 matrix in row-major order.
///
/// `inf` and `-inf` entries are accepted; they mark invalid poses.
pub fn read_matrix4(path: &Path) -> Result<Matrix4<f64>> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    let malformed = |reason: String| Error::Malformed {
        path: path.to_owned(),
        reason,
    };
    let values = text
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| malformed(format!("{:?} is not a number", token)))
        })
        .collect::<Result<Vec<f64>>>()?;
    if values.len() != 16 {
        return Err(malformed(format!("expected 16 values, found {}", values.len())));
    }
    Ok(Matrix4::from_row_slice(&values))
}

/// Builds the ground-truth model of a ScanNet scene folder.
///
/// The scene holds `color/<frame>.jpg`, the camera-to-world matrix of each frame in
/// `pose/<frame>.txt` and the color intrinsics in `intrinsic/intrinsic_color.txt`.
/// Every frame becomes an image with id `<frame>` that shares a single `PINHOLE` camera
/// with id 0. Frames with a non-finite pose are left out.
pub fn scannet_reference(scene: &Path) -> Result<PoseReference> {
    let intrinsic = read_matrix4(&scene.join("intrinsic").join("intrinsic_color.txt"))?;
    let camera = Camera::pinhole(
        0,
        SCANNET_COLOR_SIZE,
        intrinsic[(0, 0)],
        intrinsic[(1, 1)],
        intrinsic[(0, 2)],
        intrinsic[(1, 2)],
    );

    let color = scene.join("color");
    let io_error = |path: &Path| {
        let path = path.to_owned();
        move |source: std::io::Error| Error::Io { path, source }
    };
    let mut frames = vec![];
    for entry in std::fs::read_dir(&color).map_err(io_error(&color))? {
        let entry = entry.map_err(io_error(&color))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let id: ImageId = name
            .split('.')
            .next()
            .and_then(|stem| stem.parse().ok())
            .ok_or_else(|| Error::Malformed {
                path: entry.path(),
                reason: "color frames must be named <frame id>.<ext>".to_owned(),
            })?;
        frames.push((id, name));
    }
    frames.sort();

    let mut views = Vec::with_capacity(frames.len());
    for (id, name) in frames {
        let pose = read_matrix4(&scene.join("pose").join(format!("{}.txt", id)))?;
        let pose = CameraToWorld::from_homogeneous(&pose).map(Pose::inverse);
        views.push((id, name, pose));
    }
    Ok(reconstruction_from_poses(camera, views))
}

/// Picks every `stride`-th view among the first `n_views`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSelection {
    pub n_views: usize,
    pub stride: usize,
}

impl ViewSelection {
    /// Panics if `stride` is 0.
    pub fn indices(self) -> impl Iterator<Item = usize> {
        assert!(self.stride > 0, "view stride must be positive");
        (0..self.n_views).step_by(self.stride)
    }
}

/// Builds the model of a Hypersim scene from the selected views.
///
/// `views[i]` holds the image name of view `i` and its pose, if the renderer produced a
/// usable one. Image ids are view indices. Selected indices past the end of `views` are
/// ignored.
pub fn hypersim_reference(
    camera: Camera,
    views: &[(String, Option<WorldToCamera>)],
    selection: ViewSelection,
) -> PoseReference {
    let selected = selection.indices().filter_map(|index| {
        let (name, pose) = views.get(index)?;
        Some((index as ImageId, name.clone(), *pose))
    });
    reconstruction_from_poses(camera, selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_selection_strides_from_zero() {
        let selection = ViewSelection {
            n_views: 10,
            stride: 3,
        };
        assert_eq!(selection.indices().collect::<Vec<_>>(), vec![0, 3, 6, 9]);
        let all = ViewSelection {
            n_views: 2,
            stride: 1,
        };
        assert_eq!(all.indices().count(), 2);
    }

    #[test]
    fn hypersim_skips_missing_views() {
        let camera = Camera::simple_pinhole(0, ImageSize::new(1024, 768), 886.8, 512.0, 384.0);
        let views: Vec<(String, Option<WorldToCamera>)> = (0..5)
            .map(|i| {
                let pose = (i != 2).then(WorldToCamera::identity);
                (format!("frame.{:04}.color.jpg", i), pose)
            })
            .collect();
        let reference = hypersim_reference(
            camera,
            &views,
            ViewSelection {
                n_views: 8,
                stride: 2,
            },
        );
        assert_eq!(reference.missing_poses, 1);
        let ids: Vec<ImageId> = reference.reconstruction.images.keys().copied().collect();
        assert_eq!(ids, vec![0, 4]);
        assert!(reference.reconstruction.points3d.is_empty());
    }
}
