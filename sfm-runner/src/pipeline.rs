use crate::{Error, Matcher, Result, RunConfig};
use log::*;
use sfm_depth::PngDepthReader;
use sfm_model::{
    correct_sfm_with_depth, read_blacklist, scannet_reference, train_test_ids, ImageId,
    ReconstructionStore,
};
use std::path::{Path, PathBuf};
use std::process::Command;

/// The external feature, matching and triangulation pipeline.
///
/// Each stage receives paths only and reports where it put its artifacts.
pub trait PipelineDriver {
    /// Extracts local features of every image in `images` into `output_dir`.
    fn extract_features(&mut self, images: &Path, output_dir: &Path) -> Result<PathBuf>;

    /// Writes the `num_matched` closest database images of every image of `model`,
    /// by pose, into `pairs`.
    fn pairs_from_poses(&mut self, model: &Path, pairs: &Path, num_matched: usize) -> Result<()>;

    /// Matches the `features` of every pair in `pairs`.
    fn match_features(&mut self, pairs: &Path, features: &Path, output_dir: &Path)
        -> Result<PathBuf>;

    /// Triangulates the matches into `output`, keeping the poses of `reference` fixed.
    fn triangulate(
        &mut self,
        output: &Path,
        reference: &Path,
        images: &Path,
        pairs: &Path,
        features: &Path,
        matches: &Path,
    ) -> Result<()>;
}

/// Runs every stage as `<program> <stage> <args...>` and fails when it exits unsuccessfully.
///
/// Artifacts are named the way hloc names them, from the feature and matcher config
/// names.
#[derive(Debug, Clone)]
pub struct CommandDriver {
    pub program: PathBuf,
    pub features: String,
    pub matcher: String,
}

impl CommandDriver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            features: "feats-superpoint-n4096-r1024".to_owned(),
            matcher: "matches-superglue".to_owned(),
        }
    }

    fn run(&self, stage: &'static str, args: &[&Path]) -> Result<()> {
        info!("running pipeline stage {}", stage);
        let status = Command::new(&self.program)
            .arg(stage)
            .args(args)
            .status()
            .map_err(|source| Error::Launch {
                program: self.program.clone(),
                stage,
                source,
            })?;
        if !status.success() {
            return Err(Error::Stage { stage, status });
        }
        Ok(())
    }
}

impl PipelineDriver for CommandDriver {
    fn extract_features(&mut self, images: &Path, output_dir: &Path) -> Result<PathBuf> {
        let features = output_dir.join(format!("{}.h5", self.features));
        self.run("extract_features", &[images, &features])?;
        Ok(features)
    }

    fn pairs_from_poses(&mut self, model: &Path, pairs: &Path, num_matched: usize) -> Result<()> {
        let num_matched = PathBuf::from(num_matched.to_string());
        self.run("pairs_from_poses", &[model, pairs, &num_matched])
    }

    fn match_features(
        &mut self,
        pairs: &Path,
        features: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let pairs_stem = pairs
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let matches = output_dir.join(format!("{}_{}_{}.h5", self.features, self.matcher, pairs_stem));
        self.run("match_features", &[pairs, features, &matches])?;
        Ok(matches)
    }

    fn triangulate(
        &mut self,
        output: &Path,
        reference: &Path,
        images: &Path,
        pairs: &Path,
        features: &Path,
        matches: &Path,
    ) -> Result<()> {
        self.run(
            "triangulation",
            &[output, reference, images, pairs, features, matches],
        )
    }
}

/// Where the inputs and outputs of a ScanNet scene live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanNetLayout {
    /// Folder holding one folder per scene.
    pub dataset: PathBuf,
    pub scene: String,
    /// The localization results; everything else the run produces goes next to it.
    pub results_file: PathBuf,
    /// Names of the query images, one per line.
    pub test_list: Option<PathBuf>,
}

impl ScanNetLayout {
    pub fn scene_dir(&self) -> PathBuf {
        self.dataset.join(&self.scene)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.results_file
            .parent()
            .map(Path::to_owned)
            .unwrap_or_default()
    }

    pub fn color_dir(&self) -> PathBuf {
        self.scene_dir().join("color")
    }

    pub fn depth_dir(&self) -> PathBuf {
        self.scene_dir().join("depth")
    }

    /// The model built from the ground-truth poses.
    pub fn pose_model(&self) -> PathBuf {
        self.scene_dir().join("sfm_gt_pose")
    }

    /// The model triangulated from matches.
    pub fn triangulated_model(&self) -> PathBuf {
        self.scene_dir().join("sfm_superpoint+superglue")
    }

    /// The triangulated model after depth correction.
    pub fn corrected_model(&self) -> PathBuf {
        self.scene_dir().join("sfm_superpoint+superglue+depth")
    }

    pub fn pairs(&self, num_covis: usize) -> PathBuf {
        self.results_dir()
            .join(format!("pairs-db-covis{}.txt", num_covis))
    }

    pub fn log_file(&self) -> PathBuf {
        let mut log_file = self.results_file.clone().into_os_string();
        log_file.push("_logs.pkl");
        log_file.into()
    }
}

/// What a ScanNet run leaves behind for localization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanNetRun {
    /// The model to localize against.
    pub reference_model: PathBuf,
    pub log_file: PathBuf,
    pub train_ids: Vec<ImageId>,
    pub query_ids: Vec<ImageId>,
}

/// Prepares the reference model of a ScanNet scene.
///
/// The ground-truth poses become a model without points, the database images are
/// matched pairwise and triangulated against those poses, and with
/// [`RunConfig::use_dense_depth`] the triangulated points are corrected with the
/// sensor depth. Pairs, the triangulated model and the corrected model (with
/// [`RunConfig::skip_exists`]) are reused when they already exist.
pub fn run_scannet(
    config: &RunConfig,
    driver: &mut impl PipelineDriver,
    layout: &ScanNetLayout,
    store: &impl ReconstructionStore,
) -> Result<ScanNetRun> {
    if config.localization.matcher == Matcher::Gluestick {
        return Err(Error::Unsupported(
            "GlueStick is not supported by the point pipeline".to_owned(),
        ));
    }
    let scene_dir = layout.scene_dir();
    let results_dir = layout.results_dir();

    let pose_model = layout.pose_model();
    let reference = scannet_reference(&scene_dir)?;
    store.write(&reference.reconstruction, &pose_model)?;
    let blacklist = layout
        .test_list
        .as_deref()
        .map(read_blacklist)
        .transpose()?;
    let split = train_test_ids(&reference.reconstruction, blacklist.as_ref());
    info!(
        "scene {}: {} database and {} query images",
        layout.scene,
        split.train.len(),
        split.test.len()
    );

    let features = driver.extract_features(&layout.color_dir(), &results_dir)?;
    let pairs = layout.pairs(config.num_covis);
    if !pairs.exists() {
        driver.pairs_from_poses(&pose_model, &pairs, config.num_covis)?;
    }
    let matches = driver.match_features(&pairs, &features, &results_dir)?;
    let mut reference_model = layout.triangulated_model();
    if !reference_model.exists() {
        driver.triangulate(
            &reference_model,
            &pose_model,
            &scene_dir,
            &pairs,
            &features,
            &matches,
        )?;
    }

    if config.use_dense_depth {
        let corrected = layout.corrected_model();
        if !config.skip_exists || !corrected.exists() {
            let reader = PngDepthReader::new(layout.depth_dir())
                .extension(config.correction.depth_extension.clone());
            correct_sfm_with_depth(store, &reference_model, &reader, &corrected, &config.correction)?;
        } else {
            info!("reusing corrected model {}", corrected.display());
        }
        reference_model = corrected;
    }

    let model = store.read(&reference_model)?;
    info!(
        "reference model {} has {} images and {} points",
        reference_model.display(),
        model.images.len(),
        model.points3d.len()
    );

    Ok(ScanNetRun {
        reference_model,
        log_file: layout.log_file(),
        train_ids: split.train,
        query_ids: split.test,
    })
}
