//! Face localization: the `FaceLocator` capability and strategy factory.

use crate::cascade::CascadeLocator;
use crate::config::{LocatorConfig, MIN_IMAGE_SIDE};
use crate::scrfd::ScrfdLocator;
use crate::types::Face;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("image {width}x{height} is below the {min}x{min} minimum")]
    ImageTooSmall { width: u32, height: u32, min: u32 },
    #[error("invalid locator configuration: {0}")]
    InvalidConfig(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A face detection strategy.
///
/// Implementations are read-only after construction and are shared across
/// concurrent swaps without locking on the caller's side.
pub trait FaceLocator: Send + Sync {
    /// Find candidate faces in `image`.
    ///
    /// "No face" is an empty vector, never an error. Errors are reserved for
    /// degenerate input and detector malfunction.
    fn locate(&self, image: &RgbImage) -> Result<Vec<Face>, LocatorError>;

    /// Short strategy name for logs.
    fn name(&self) -> &'static str;
}

/// Reject images too small to hold a detectable face.
pub fn ensure_min_size(image: &RgbImage) -> Result<(), LocatorError> {
    let (width, height) = image.dimensions();
    if width < MIN_IMAGE_SIDE || height < MIN_IMAGE_SIDE {
        return Err(LocatorError::ImageTooSmall {
            width,
            height,
            min: MIN_IMAGE_SIDE,
        });
    }
    Ok(())
}

/// Which detector to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorKind {
    /// Haar-style sliding-window cascade, no model file needed.
    #[default]
    Cascade,
    /// SCRFD ONNX model with five-point landmarks.
    Scrfd,
}

impl FromStr for LocatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cascade" | "haar" => Ok(Self::Cascade),
            "scrfd" | "landmark" => Ok(Self::Scrfd),
            other => Err(format!("unknown detector '{other}' (expected cascade or scrfd)")),
        }
    }
}

/// Build the requested locator.
///
/// SCRFD needs the ONNX model bytes; when they are missing or fail to load
/// the cascade locator is used instead.
pub fn build_locator(
    kind: LocatorKind,
    scrfd_model: Option<&[u8]>,
    config: LocatorConfig,
) -> Result<Arc<dyn FaceLocator>, LocatorError> {
    config
        .validate()
        .map_err(|e| LocatorError::InvalidConfig(e.to_string()))?;

    if kind == LocatorKind::Scrfd {
        match scrfd_model {
            Some(bytes) => match ScrfdLocator::from_bytes(bytes, config.clone()) {
                Ok(locator) => return Ok(Arc::new(locator)),
                Err(e) => {
                    tracing::warn!(error = %e, "SCRFD model failed to load; falling back to cascade locator");
                }
            },
            None => {
                tracing::warn!("SCRFD requested without model data; falling back to cascade locator");
            }
        }
    }

    Ok(Arc::new(CascadeLocator::new(config)))
}
