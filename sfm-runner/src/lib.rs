//! Glue between the datasets, the external localization pipeline and the depth
//! correction of `sfm-model`.
//!
//! The pipeline stages themselves (feature extraction, matching, triangulation) run
//! outside of this crate behind [`PipelineDriver`]; this crate only decides which stage
//! runs when, where its artifacts go and what the results are called.

mod config;
mod filenames;
mod pipeline;

pub use config::*;
pub use filenames::*;
pub use pipeline::*;

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] sfm_model::Error),
    #[error("could not read config {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported configuration: {0}")]
    Unsupported(String),
    #[error("could not launch {program:?} for stage {stage}: {source}")]
    Launch {
        program: PathBuf,
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("pipeline stage {stage} failed with {status}")]
    Stage {
        stage: &'static str,
        status: ExitStatus,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
