use crate::{Error, Result};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// The settings for correcting a reconstruction with depth.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionSettings {
    /// Points at or closer than this depth in front of a camera are treated as not visible.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_eps"))]
    pub eps: f64,
    /// Projections closer than this many pixels to the image border are discarded.
    ///
    /// Must be at least 1 so that every kept projection lies strictly inside the image.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_pad"))]
    pub pad: u32,
    /// The extension of the depth images that replaces `jpg` in image names.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_depth_extension"))]
    pub depth_extension: String,
}

fn default_eps() -> f64 {
    1e-4
}

fn default_pad() -> u32 {
    1
}

fn default_depth_extension() -> String {
    "png".to_owned()
}

impl Default for CorrectionSettings {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            pad: default_pad(),
            depth_extension: default_depth_extension(),
        }
    }
}

impl CorrectionSettings {
    /// Rejects settings the correction cannot run with.
    ///
    /// `pad` must be at least 1 and `eps` finite and positive.
    pub fn validate(&self) -> Result<()> {
        if self.pad < 1 {
            return Err(Error::InvalidSettings(format!(
                "pad must be at least 1, got {}",
                self.pad
            )));
        }
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(Error::InvalidSettings(format!(
                "eps must be finite and positive, got {}",
                self.eps
            )));
        }
        Ok(())
    }
}
