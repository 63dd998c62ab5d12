use crate::{
    CorrectionSettings, Error, ImageId, Point3DId, Reconstruction, ReconstructionStore, Result,
};
use log::*;
use sfm_core::{KeyPoint, WorldPoint};
use sfm_depth::{sample_depth, DepthMap, DepthReader};
use sfm_pinhole::{back_project, project_to_image};
use std::path::Path;

/// Why an image was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// None of the keypoints of the image observe a 3D point.
    NoPoints,
    /// A keypoint references a 3D point that does not exist.
    MissingPoint(Point3DId),
}

/// What happened to the points of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCorrection {
    Corrected {
        /// Associations dropped because the point left the image or had no depth.
        invalidated: usize,
        /// Points moved onto the sensor depth.
        moved: usize,
    },
    Skipped(SkipReason),
}

/// Totals over a whole correction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionSummary {
    pub corrected: usize,
    pub skipped: usize,
    pub invalidated: usize,
    pub moved: usize,
}

impl CorrectionSummary {
    fn add(&mut self, correction: ImageCorrection) {
        match correction {
            ImageCorrection::Corrected { invalidated, moved } => {
                self.corrected += 1;
                self.invalidated += invalidated;
                self.moved += moved;
            }
            ImageCorrection::Skipped(_) => self.skipped += 1,
        }
    }
}

impl Reconstruction {
    /// Moves the 3D points observed by `image_id` onto the depth measured by `depth`.
    ///
    /// Every associated point is projected into the image. Points that land outside the
    /// padded image or behind the camera, or where `depth` has no valid value, lose
    /// their association with this image on both sides: the slot is cleared and the
    /// observation is removed from the point's track. The remaining points are replaced
    /// by the back-projection of their keypoint at the sensor depth.
    ///
    /// The point positions are updated in place, so images corrected later see the
    /// positions written by earlier ones.
    pub fn correct_image_with_depth(
        &mut self,
        image_id: ImageId,
        depth: &DepthMap,
        settings: &CorrectionSettings,
    ) -> Result<ImageCorrection> {
        settings.validate()?;
        let image = self
            .images
            .get(&image_id)
            .ok_or(Error::MissingImage(image_id))?;
        let camera = self
            .cameras
            .get(&image.camera_id)
            .ok_or_else(|| Error::MissingCamera {
                image: image.name.clone(),
                camera: image.camera_id,
            })?;
        let intrinsics = camera.intrinsics()?;
        let size = camera.size();
        let pose = image.pose;

        let associations: Vec<(usize, Point3DId)> = image.associations().collect();
        if associations.is_empty() {
            warn!("image {} has no 3D points", image.name);
            return Ok(ImageCorrection::Skipped(SkipReason::NoPoints));
        }
        let mut points: Vec<WorldPoint> = Vec::with_capacity(associations.len());
        for &(slot, point) in &associations {
            match self.points3d.get(&point) {
                Some(point) => points.push(point.xyz),
                None => {
                    warn!(
                        "image {} slot {} references missing 3D point {}, skipping it",
                        image.name, slot, point
                    );
                    return Ok(ImageCorrection::Skipped(SkipReason::MissingPoint(point)));
                }
            }
        }

        let projection = project_to_image(&points, pose, &intrinsics, size, settings.eps, settings.pad);
        let samples = sample_depth(depth, &projection.keypoints, size);
        let keypoints: Vec<KeyPoint> = projection
            .keypoints
            .iter()
            .zip(&samples.valid)
            .filter(|&(_, &valid)| valid)
            .map(|(&keypoint, _)| keypoint)
            .collect();
        let scene = back_project(&keypoints, pose, &samples.valid_depths(), &intrinsics);

        // Samples only exist for the projected points, so walk them alongside.
        let mut sampled = samples.valid.iter().copied();
        let valid: Vec<bool> = projection
            .valid
            .iter()
            .map(|&projected| projected && sampled.next().unwrap_or(false))
            .collect();

        let mut invalidated = 0;
        for (&(slot, point), &valid) in associations.iter().zip(&valid) {
            if !valid {
                self.remove_observations(point, image_id);
                if let Some(image) = self.images.get_mut(&image_id) {
                    image.point3d_ids[slot] = None;
                }
                invalidated += 1;
            }
        }

        let image = self
            .images
            .get(&image_id)
            .ok_or(Error::MissingImage(image_id))?;
        let remaining: Vec<Point3DId> = image.point3d_ids.iter().flatten().copied().collect();
        if remaining.len() != scene.len() {
            return Err(Error::AssociationMismatch {
                image: image.name.clone(),
                slots: remaining.len(),
                points: scene.len(),
            });
        }
        for (point, xyz) in remaining.into_iter().zip(scene) {
            if let Some(point) = self.points3d.get_mut(&point) {
                point.xyz = xyz;
            }
        }
        let moved = valid.len() - invalidated;
        debug!(
            "image {}: moved {} points, dropped {} associations",
            image_id, moved, invalidated
        );
        Ok(ImageCorrection::Corrected { invalidated, moved })
    }

    /// Corrects every image in turn, in ascending id order, with the depth map `reader`
    /// returns for the image name.
    ///
    /// A missing or unreadable depth map aborts the whole pass. Images that cannot be
    /// corrected are skipped with a warning and counted in the summary.
    pub fn correct_with_depth(
        &mut self,
        reader: &impl DepthReader,
        settings: &CorrectionSettings,
    ) -> Result<CorrectionSummary> {
        settings.validate()?;
        info!("correcting {} images with sensor depth", self.images.len());
        let mut summary = CorrectionSummary::default();
        let image_ids: Vec<(ImageId, String)> = self
            .images
            .values()
            .map(|image| (image.id, image.name.clone()))
            .collect();
        for (image_id, name) in image_ids {
            let depth = reader
                .read(&name)
                .map_err(|source| Error::Depth { image: name, source })?;
            summary.add(self.correct_image_with_depth(image_id, &depth, settings)?);
        }
        info!(
            "corrected {} images ({} skipped), moved {} points, dropped {} associations",
            summary.corrected, summary.skipped, summary.moved, summary.invalidated
        );
        Ok(summary)
    }
}

/// Reads the model at `input`, corrects it with the depth maps from `reader` and writes
/// the result to `output`. The input model is never modified.
pub fn correct_sfm_with_depth(
    store: &impl ReconstructionStore,
    input: &Path,
    reader: &impl DepthReader,
    output: &Path,
    settings: &CorrectionSettings,
) -> Result<CorrectionSummary> {
    if same_location(input, output) {
        return Err(Error::OutputIsInput(output.to_owned()));
    }
    let mut reconstruction = store.read(input)?;
    let summary = reconstruction.correct_with_depth(reader, settings)?;
    store.write(&reconstruction, output)?;
    Ok(summary)
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
