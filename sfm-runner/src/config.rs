use crate::{Error, Result};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use sfm_model::CorrectionSettings;
use std::fmt;
use std::path::{Path, PathBuf};

/// How query poses are estimated from the matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RansacMethod {
    Ransac,
    Hybrid,
    /// Solver-first RANSAC.
    Solver,
}

impl RansacMethod {
    pub fn name(self) -> &'static str {
        match self {
            RansacMethod::Ransac => "ransac",
            RansacMethod::Hybrid => "hybrid",
            RansacMethod::Solver => "solver",
        }
    }
}

/// Thresholds keep their JSON spelling (`5` or `5.0`) since it ends up in result names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RansacConfig {
    #[serde(default)]
    pub method: Option<RansacMethod>,
    #[serde(default)]
    pub thres: Option<Number>,
    #[serde(default)]
    pub thres_point: Option<Number>,
    #[serde(default)]
    pub thres_line: Option<Number>,
}

/// The 2D matcher of points and lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    Superglue,
    SuperglueEndpoints,
    Gluestick,
    Sold2,
    Lbd,
    L2d2,
    Linetr,
    NnEndpoints,
}

impl Matcher {
    pub fn name(self) -> &'static str {
        match self {
            Matcher::Superglue => "superglue",
            Matcher::SuperglueEndpoints => "superglue_endpoints",
            Matcher::Gluestick => "gluestick",
            Matcher::Sold2 => "sold2",
            Matcher::Lbd => "lbd",
            Matcher::L2d2 => "l2d2",
            Matcher::Linetr => "linetr",
            Matcher::NnEndpoints => "nn_endpoints",
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationConfig {
    #[serde(rename = "2d_matcher")]
    pub matcher: Matcher,
    #[serde(default)]
    pub ransac: RansacConfig,
    #[serde(default)]
    pub reprojection_filter: Option<String>,
    /// Only has an effect with [`Matcher::SuperglueEndpoints`].
    #[serde(default)]
    pub epipolar_filter: bool,
    #[serde(default = "default_line_cost_func")]
    pub line_cost_func: String,
}

fn default_line_cost_func() -> String {
    "PerpendicularDist".to_owned()
}

/// Everything a run needs, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub localization: LocalizationConfig,
    /// Reuse outputs that already exist instead of recomputing them.
    #[serde(default)]
    pub skip_exists: bool,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// How many database images each database image is paired with.
    #[serde(default = "default_num_covis")]
    pub num_covis: usize,
    /// Correct the triangulated model with sensor depth before using it.
    #[serde(default)]
    pub use_dense_depth: bool,
    #[serde(default)]
    pub correction: CorrectionSettings,
}

fn default_num_covis() -> usize {
    30
}

impl RunConfig {
    /// Parses a JSON config. Unknown matcher or RANSAC method tags and correction
    /// settings the correction cannot run with are errors.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        validate_correction(&config.correction)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| Error::ConfigIo {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&json)
    }
}

fn validate_correction(settings: &CorrectionSettings) -> Result<()> {
    settings
        .validate()
        .map_err(|e| Error::Unsupported(e.to_string()))
}

/// Loads correction settings from a JSON file, using the defaults when there is no
/// such file. A file that exists but cannot be read or parsed is an error.
pub fn load_correction_settings(path: &Path) -> Result<CorrectionSettings> {
    let settings = match std::fs::File::open(path) {
        Ok(file) => {
            let settings = serde_json::from_reader(std::io::BufReader::new(file))?;
            info!("loaded settings from {}", path.display());
            settings
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("used default settings");
            CorrectionSettings::default()
        }
        Err(source) => {
            return Err(Error::ConfigIo {
                path: path.to_owned(),
                source,
            })
        }
    };
    validate_correction(&settings)?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = RunConfig::from_json(r#"{"localization": {"2d_matcher": "sold2"}}"#).unwrap();
        assert_eq!(config.localization.matcher, Matcher::Sold2);
        assert_eq!(config.localization.ransac.method, None);
        assert_eq!(config.localization.line_cost_func, "PerpendicularDist");
        assert_eq!(config.num_covis, 30);
        assert!(!config.skip_exists);
        assert!(!config.use_dense_depth);
        assert_eq!(config.correction, CorrectionSettings::default());
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert!(RunConfig::from_json(r#"{"localization": {"2d_matcher": "orb"}}"#).is_err());
        assert!(RunConfig::from_json(
            r#"{"localization": {"2d_matcher": "lbd", "ransac": {"method": "lmeds"}}}"#
        )
        .is_err());
    }

    #[test]
    fn correction_settings_are_partial() {
        let config = RunConfig::from_json(
            r#"{"localization": {"2d_matcher": "superglue_endpoints"}, "correction": {"pad": 4}}"#,
        )
        .unwrap();
        assert_eq!(config.localization.matcher, Matcher::SuperglueEndpoints);
        assert_eq!(config.correction.pad, 4);
        assert_eq!(config.correction.eps, 1e-4);
        assert_eq!(config.correction.depth_extension, "png");
    }

    #[test]
    fn unusable_correction_settings_are_rejected() {
        for correction in [r#"{"pad": 0}"#, r#"{"eps": 0.0}"#, r#"{"eps": -1.0}"#] {
            let json = format!(
                r#"{{"localization": {{"2d_matcher": "superglue"}}, "correction": {}}}"#,
                correction
            );
            assert!(
                matches!(RunConfig::from_json(&json), Err(Error::Unsupported(_))),
                "{} accepted",
                correction
            );
        }
    }

    #[test]
    fn missing_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_correction_settings(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, CorrectionSettings::default());
    }

    #[test]
    fn bad_settings_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_correction_settings(&path), Err(Error::Json(_))));

        std::fs::write(&path, r#"{"pad": "one"}"#).unwrap();
        assert!(matches!(load_correction_settings(&path), Err(Error::Json(_))));

        std::fs::write(&path, r#"{"pad": 0}"#).unwrap();
        assert!(matches!(
            load_correction_settings(&path),
            Err(Error::Unsupported(_))
        ));

        std::fs::write(&path, r#"{"pad": 3, "depth_extension": "tiff"}"#).unwrap();
        let settings = load_correction_settings(&path).unwrap();
        assert_eq!(settings.pad, 3);
        assert_eq!(settings.depth_extension, "tiff");

        // A directory cannot be read as a file.
        assert!(load_correction_settings(dir.path()).is_err());
    }

    #[test]
    fn matcher_names_match_tags() {
        for matcher in [
            Matcher::Superglue,
            Matcher::SuperglueEndpoints,
            Matcher::Gluestick,
            Matcher::Sold2,
            Matcher::Lbd,
            Matcher::L2d2,
            Matcher::Linetr,
            Matcher::NnEndpoints,
        ] {
            let json = serde_json::to_string(&matcher).unwrap();
            assert_eq!(json, format!("\"{}\"", matcher.name()));
        }
    }
}
