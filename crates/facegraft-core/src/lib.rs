//! facegraft-core: face region compositing engine.
//!
//! Takes two decoded photos, finds the largest face in each, stretches the
//! second photo's face onto the first photo's face region, blends it in
//! through a feathered elliptical mask and stamps a caption. Detection is
//! pluggable: a model-free sliding-window cascade, or SCRFD via ONNX
//! Runtime when a model is supplied. The crate performs no file or network
//! I/O.

pub mod alignment;
pub mod annotator;
pub mod cascade;
pub mod compositor;
pub mod config;
pub mod error;
mod font;
pub mod locator;
pub mod mask;
pub mod normalizer;
pub mod pipeline;
pub mod scrfd;
pub mod selector;
pub mod types;

#[cfg(test)]
mod test_support;

pub use cascade::CascadeLocator;
pub use config::{AnnotationConfig, ConfigError, LocatorConfig, MaskConfig, SwapConfig};
pub use error::SwapError;
pub use locator::{build_locator, FaceLocator, LocatorError, LocatorKind};
pub use mask::MaskBuilder;
pub use normalizer::{FaceNormalizer, LandmarkWarp, NormalizerKind, RectResize};
pub use pipeline::{CompositeResult, Role, SwapFailure, SwapPipeline, SwapState};
pub use scrfd::ScrfdLocator;
pub use types::{Face, Landmarks, Mask, Region};
