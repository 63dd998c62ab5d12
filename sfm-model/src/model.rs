use crate::{Error, Result};
use log::*;
use sfm_core::{KeyPoint, WorldPoint, WorldToCamera};
use sfm_pinhole::{CameraIntrinsics, ImageSize};
use std::collections::BTreeMap;

pub type CameraId = u32;
pub type ImageId = u32;
pub type Point3DId = u64;

/// The camera models COLMAP knows about, with their on-disk ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraModelId {
    SimplePinhole,
    Pinhole,
    SimpleRadial,
    Radial,
    OpenCv,
    OpenCvFisheye,
    FullOpenCv,
    Fov,
    SimpleRadialFisheye,
    RadialFisheye,
    ThinPrismFisheye,
}

impl CameraModelId {
    pub const ALL: [CameraModelId; 11] = [
        CameraModelId::SimplePinhole,
        CameraModelId::Pinhole,
        CameraModelId::SimpleRadial,
        CameraModelId::Radial,
        CameraModelId::OpenCv,
        CameraModelId::OpenCvFisheye,
        CameraModelId::FullOpenCv,
        CameraModelId::Fov,
        CameraModelId::SimpleRadialFisheye,
        CameraModelId::RadialFisheye,
        CameraModelId::ThinPrismFisheye,
    ];

    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn from_id(id: i32) -> Option<Self> {
        usize::try_from(id).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn name(self) -> &'static str {
        match self {
            CameraModelId::SimplePinhole => "SIMPLE_PINHOLE",
            CameraModelId::Pinhole => "PINHOLE",
            CameraModelId::SimpleRadial => "SIMPLE_RADIAL",
            CameraModelId::Radial => "RADIAL",
            CameraModelId::OpenCv => "OPENCV",
            CameraModelId::OpenCvFisheye => "OPENCV_FISHEYE",
            CameraModelId::FullOpenCv => "FULL_OPENCV",
            CameraModelId::Fov => "FOV",
            CameraModelId::SimpleRadialFisheye => "SIMPLE_RADIAL_FISHEYE",
            CameraModelId::RadialFisheye => "RADIAL_FISHEYE",
            CameraModelId::ThinPrismFisheye => "THIN_PRISM_FISHEYE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|model| model.name() == name)
    }

    /// Number of entries in [`Camera::params`] for this model.
    pub fn num_params(self) -> usize {
        match self {
            CameraModelId::SimplePinhole => 3,
            CameraModelId::Pinhole => 4,
            CameraModelId::SimpleRadial => 4,
            CameraModelId::Radial => 5,
            CameraModelId::OpenCv => 8,
            CameraModelId::OpenCvFisheye => 8,
            CameraModelId::FullOpenCv => 12,
            CameraModelId::Fov => 5,
            CameraModelId::SimpleRadialFisheye => 4,
            CameraModelId::RadialFisheye => 5,
            CameraModelId::ThinPrismFisheye => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub id: CameraId,
    pub model: CameraModelId,
    pub width: u32,
    pub height: u32,
    pub params: Vec<f64>,
}

impl Camera {
    /// A `PINHOLE` camera.
    pub fn pinhole(id: CameraId, size: ImageSize, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            id,
            model: CameraModelId::Pinhole,
            width: size.width,
            height: size.height,
            params: vec![fx, fy, cx, cy],
        }
    }

    /// A `SIMPLE_PINHOLE` camera.
    pub fn simple_pinhole(id: CameraId, size: ImageSize, f: f64, cx: f64, cy: f64) -> Self {
        Self {
            id,
            model: CameraModelId::SimplePinhole,
            width: size.width,
            height: size.height,
            params: vec![f, cx, cy],
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    /// The pinhole intrinsics of the camera.
    ///
    /// Only `SIMPLE_PINHOLE` and `PINHOLE` cameras have them; models with distortion
    /// are an error.
    pub fn intrinsics(&self) -> Result<CameraIntrinsics> {
        match (self.model, self.params.as_slice()) {
            (CameraModelId::SimplePinhole, &[f, cx, cy]) => {
                Ok(CameraIntrinsics::pinhole(f, f, cx, cy))
            }
            (CameraModelId::Pinhole, &[fx, fy, cx, cy]) => {
                Ok(CameraIntrinsics::pinhole(fx, fy, cx, cy))
            }
            _ => Err(Error::UnsupportedCameraModel {
                camera: self.id,
                model: self.model.name(),
            }),
        }
    }
}

/// A registered image.
///
/// `points2d` and `point3d_ids` are parallel: slot `i` is the keypoint `points2d[i]`,
/// which observes the 3D point `point3d_ids[i]` if it has one.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: ImageId,
    pub pose: WorldToCamera,
    pub camera_id: CameraId,
    pub name: String,
    pub points2d: Vec<KeyPoint>,
    pub point3d_ids: Vec<Option<Point3DId>>,
}

impl Image {
    /// An image with no keypoints.
    pub fn new(id: ImageId, name: impl Into<String>, camera_id: CameraId, pose: WorldToCamera) -> Self {
        Self {
            id,
            pose,
            camera_id,
            name: name.into(),
            points2d: vec![],
            point3d_ids: vec![],
        }
    }

    /// Iterates over the slots that have an associated 3D point.
    pub fn associations(&self) -> impl Iterator<Item = (usize, Point3DId)> + '_ {
        self.point3d_ids
            .iter()
            .enumerate()
            .filter_map(|(slot, &point)| point.map(|point| (slot, point)))
    }

    pub fn num_points3d(&self) -> usize {
        self.point3d_ids.iter().flatten().count()
    }
}

/// One observation of a 3D point: the keypoint `point2d_idx` of image `image_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackElement {
    pub image_id: ImageId,
    pub point2d_idx: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point3D {
    pub id: Point3DId,
    pub xyz: WorldPoint,
    pub rgb: [u8; 3],
    pub error: f64,
    pub track: Vec<TrackElement>,
}

/// A sparse reconstruction in the COLMAP data model.
///
/// Tables are keyed by id and kept ordered so that iteration (and therefore every
/// algorithm that walks the images in turn) is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    pub cameras: BTreeMap<CameraId, Camera>,
    pub images: BTreeMap<ImageId, Image>,
    pub points3d: BTreeMap<Point3DId, Point3D>,
}

impl Reconstruction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_camera(&mut self, camera: Camera) {
        self.cameras.insert(camera.id, camera);
    }

    pub fn add_image(&mut self, image: Image) {
        self.images.insert(image.id, image);
    }

    pub fn add_point3d(&mut self, point: Point3D) {
        self.points3d.insert(point.id, point);
    }

    pub fn image_by_name(&self, name: &str) -> Option<&Image> {
        self.images.values().find(|image| image.name == name)
    }

    /// The total number of observations over all tracks.
    pub fn num_observations(&self) -> usize {
        self.points3d.values().map(|point| point.track.len()).sum()
    }

    /// Removes every observation of `point` made by `image` and returns how many there were.
    ///
    /// Only the track is touched; the point stays even if its track becomes empty.
    pub fn remove_observations(&mut self, point: Point3DId, image: ImageId) -> usize {
        match self.points3d.get_mut(&point) {
            Some(point) => {
                let before = point.track.len();
                point.track.retain(|element| element.image_id != image);
                before - point.track.len()
            }
            None => 0,
        }
    }

    /// Checks the bookkeeping between images, cameras and tracks.
    ///
    /// Every violation is logged as an error and the first one is returned. An empty
    /// track is not a violation.
    pub fn sanity_check(&self) -> Result<()> {
        info!("SANITY CHECK: checking {} images and {} points", self.images.len(), self.points3d.len());
        let mut violations = vec![];
        for image in self.images.values() {
            if !self.cameras.contains_key(&image.camera_id) {
                violations.push(format!(
                    "image {} uses camera {}, which does not exist",
                    image.id, image.camera_id
                ));
            }
            if image.points2d.len() != image.point3d_ids.len() {
                violations.push(format!(
                    "image {} has {} keypoints but {} point slots",
                    image.id,
                    image.points2d.len(),
                    image.point3d_ids.len()
                ));
            }
            for (slot, point_id) in image.associations() {
                let observed = TrackElement {
                    image_id: image.id,
                    point2d_idx: slot as u32,
                };
                match self.points3d.get(&point_id) {
                    None => violations.push(format!(
                        "image {} slot {} references point {}, which does not exist",
                        image.id, slot, point_id
                    )),
                    Some(point) if !point.track.contains(&observed) => violations.push(format!(
                        "image {} slot {} references point {}, whose track does not contain it",
                        image.id, slot, point_id
                    )),
                    Some(_) => {}
                }
            }
        }
        for point in self.points3d.values() {
            for element in &point.track {
                let slot = self
                    .images
                    .get(&element.image_id)
                    .and_then(|image| image.point3d_ids.get(element.point2d_idx as usize));
                if slot != Some(&Some(point.id)) {
                    violations.push(format!(
                        "point {} is observed by image {} slot {}, which holds {:?}",
                        point.id, element.image_id, element.point2d_idx, slot
                    ));
                }
            }
        }
        for violation in &violations {
            error!("SANITY CHECK FAILURE: {}", violation);
        }
        info!("SANITY CHECK ENDED");
        let count = violations.len();
        match violations.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(Error::Inconsistent { count, first }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfm_core::nalgebra::Point3;
    use sfm_core::Pose;

    fn two_view() -> Reconstruction {
        let mut reconstruction = Reconstruction::new();
        reconstruction.add_camera(Camera::pinhole(1, ImageSize::new(100, 100), 50.0, 50.0, 50.0, 50.0));
        for id in [1, 2] {
            let mut image = Image::new(id, format!("{}.jpg", id), 1, WorldToCamera::identity());
            image.points2d = vec![KeyPoint::new(50.0, 50.0), KeyPoint::new(10.0, 10.0)];
            image.point3d_ids = vec![Some(7), None];
            reconstruction.add_image(image);
        }
        reconstruction.add_point3d(Point3D {
            id: 7,
            xyz: WorldPoint(Point3::new(0.0, 0.0, 1.0)),
            rgb: [255, 0, 0],
            error: 0.5,
            track: vec![
                TrackElement { image_id: 1, point2d_idx: 0 },
                TrackElement { image_id: 2, point2d_idx: 0 },
            ],
        });
        reconstruction
    }

    #[test]
    fn consistent_model_passes() {
        let reconstruction = two_view();
        reconstruction.sanity_check().unwrap();
        assert_eq!(reconstruction.num_observations(), 2);
        assert_eq!(reconstruction.image_by_name("2.jpg").map(|image| image.id), Some(2));
    }

    #[test]
    fn track_without_slot_is_reported() {
        let mut reconstruction = two_view();
        reconstruction.images.get_mut(&2).unwrap().point3d_ids[0] = None;
        assert!(matches!(
            reconstruction.sanity_check(),
            Err(Error::Inconsistent { .. })
        ));
    }

    #[test]
    fn removing_observations_keeps_orphans() {
        let mut reconstruction = two_view();
        assert_eq!(reconstruction.remove_observations(7, 1), 1);
        assert_eq!(reconstruction.remove_observations(7, 2), 1);
        assert_eq!(reconstruction.remove_observations(7, 2), 0);
        assert!(reconstruction.points3d[&7].track.is_empty());
        assert_eq!(reconstruction.remove_observations(8, 1), 0);
    }

    #[test]
    fn only_pinhole_models_have_intrinsics() {
        let simple = Camera::simple_pinhole(0, ImageSize::new(10, 10), 5.0, 4.0, 3.0);
        let intrinsics = simple.intrinsics().unwrap();
        assert_eq!(intrinsics.focals.x, 5.0);
        assert_eq!(intrinsics.focals.y, 5.0);
        let radial = Camera {
            id: 3,
            model: CameraModelId::SimpleRadial,
            width: 10,
            height: 10,
            params: vec![5.0, 4.0, 3.0, 0.1],
        };
        assert!(matches!(
            radial.intrinsics(),
            Err(Error::UnsupportedCameraModel { camera: 3, model: "SIMPLE_RADIAL" })
        ));
    }

    #[test]
    fn model_ids_and_names_agree() {
        for model in CameraModelId::ALL {
            assert_eq!(CameraModelId::from_id(model.id()), Some(model));
            assert_eq!(CameraModelId::from_name(model.name()), Some(model));
        }
        assert_eq!(CameraModelId::Pinhole.id(), 1);
        assert_eq!(CameraModelId::from_id(11), None);
        assert_eq!(CameraModelId::from_id(-1), None);
    }
}
