//! Tunable parameters for every pipeline stage.
//!
//! All fields carry defaults so a partial TOML document (or none at all)
//! yields a usable configuration. The core never reads files; callers hand
//! in the TOML text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest image side the locators accept, in pixels.
pub const MIN_IMAGE_SIDE: u32 = 20;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("parse: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value: {0}")]
    Invalid(String),
}

/// Face locator tuning, shared by every locator strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Growth factor between successive search window sizes (> 1.0).
    pub scale_factor: f32,
    /// Overlapping window hits required before a cascade cluster is reported.
    pub min_neighbors: u32,
    /// Smallest face side reported, in pixels.
    pub min_face_size: u32,
    /// Sliding-window step as a fraction of the window side.
    pub window_stride: f32,
    /// Score threshold for the landmark (SCRFD) detector.
    pub min_confidence: f32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            min_face_size: 30,
            window_stride: 0.05,
            min_confidence: 0.5,
        }
    }
}

impl LocatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scale_factor > 1.0 && self.scale_factor.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "locator.scale_factor must be > 1.0, got {}",
                self.scale_factor
            )));
        }
        if self.min_neighbors == 0 {
            return Err(ConfigError::Invalid("locator.min_neighbors must be >= 1".into()));
        }
        if self.min_face_size < MIN_IMAGE_SIDE {
            return Err(ConfigError::Invalid(format!(
                "locator.min_face_size must be >= {MIN_IMAGE_SIDE}, got {}",
                self.min_face_size
            )));
        }
        if !(self.window_stride > 0.0 && self.window_stride <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "locator.window_stride must be in (0, 1], got {}",
                self.window_stride
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "locator.min_confidence must be in [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

/// Feathered mask tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Side of the square Gaussian blur kernel (odd).
    pub blur_kernel: u32,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self { blur_kernel: 15 }
    }
}

impl MaskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            return Err(ConfigError::Invalid(format!(
                "mask.blur_kernel must be odd and >= 1, got {}",
                self.blur_kernel
            )));
        }
        Ok(())
    }
}

/// Caption stamped on every composite. Glyph scale and colours are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub lines: Vec<String>,
    /// Left edge of the caption block.
    pub x: u32,
    /// Top edge of the caption block.
    pub y: u32,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            lines: vec!["FACEGRAFT".into(), "MADE WITH FACEGRAFT".into()],
            x: 10,
            y: 10,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    pub locator: LocatorConfig,
    pub mask: MaskConfig,
    pub annotation: AnnotationConfig,
}

impl SwapConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: SwapConfig = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.locator.validate()?;
        self.mask.validate()
    }
}
