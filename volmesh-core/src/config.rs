//! Per-run pipeline parameters and stack metadata

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Immutable parameters of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Factor by which the volume was downsampled from full resolution
    pub downsample_factor: f64,
    /// Global offset `(x, y, z)` added after scaling, in physical units
    pub offset: [f64; 3],
    /// Smoothing iterations requested from the isosurface extractor
    pub smoothing_iterations: usize,
    /// Target fraction of faces to keep; `None` disables simplification.
    /// Meshes left with four faces or fewer at this ratio are not simplified.
    pub simplify_ratio: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            downsample_factor: 1.0,
            offset: [0.0; 3],
            smoothing_iterations: 3,
            simplify_ratio: None,
        }
    }
}

impl PipelineConfig {
    /// Build a config from stack metadata, keeping the default smoothing
    pub fn from_metadata(metadata: &StackMetadata) -> Self {
        let factor = metadata.downsample_factor;
        Self {
            downsample_factor: factor,
            offset: metadata.offset.map(|o| o * factor),
            ..Self::default()
        }
    }

    /// Set the downsample factor
    pub fn with_downsample_factor(mut self, factor: f64) -> Self {
        self.downsample_factor = factor;
        self
    }

    /// Set the global `(x, y, z)` offset
    pub fn with_offset(mut self, offset: [f64; 3]) -> Self {
        self.offset = offset;
        self
    }

    /// Set the smoothing iteration count
    pub fn with_smoothing_iterations(mut self, iterations: usize) -> Self {
        self.smoothing_iterations = iterations;
        self
    }

    /// Enable simplification with the given ratio
    pub fn with_simplify_ratio(mut self, ratio: f64) -> Self {
        self.simplify_ratio = Some(ratio);
        self
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<()> {
        if !self.downsample_factor.is_finite() || self.downsample_factor < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "downsample factor must be a finite value >= 1, got {}",
                self.downsample_factor
            )));
        }
        if self.offset.iter().any(|o| !o.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "offset must be finite, got {:?}",
                self.offset
            )));
        }
        if let Some(ratio) = self.simplify_ratio {
            validate_ratio(ratio)?;
        }
        Ok(())
    }
}

/// Check that a simplification ratio lies in `(0, 1]`
pub fn validate_ratio(ratio: f64) -> Result<()> {
    if ratio.is_finite() && ratio > 0.0 && ratio <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "simplification ratio must be in (0, 1], got {ratio}"
        )))
    }
}

/// Placement metadata attached to an image stack.
///
/// Offsets are in (downsampled) voxel units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackMetadata {
    pub offset: [f64; 3],
    pub downsample_factor: f64,
}

impl Default for StackMetadata {
    fn default() -> Self {
        Self {
            offset: [0.0; 3],
            downsample_factor: 1.0,
        }
    }
}

impl StackMetadata {
    /// Parse metadata from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load metadata from a TOML sidecar file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
