//! Pipeline controller: sequences locate → select → normalize → mask →
//! composite → annotate over one photo pair.
//!
//! The first photo of a pair is always the recipient (its face is
//! replaced, every other pixel kept); the second photo supplies the donor
//! face. The controller is stateless: each [`SwapPipeline::run`] call is
//! independent and returns either a finished composite or a structured
//! [`SwapFailure`], never a panic.

use crate::annotator::Annotator;
use crate::compositor;
use crate::config::SwapConfig;
use crate::error::SwapError;
use crate::locator::FaceLocator;
use crate::mask::MaskBuilder;
use crate::normalizer::{FaceNormalizer, RectResize};
use crate::selector;
use crate::types::Face;
use image::RgbImage;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Which photo of the pair a face belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// First photo: provides the canvas.
    Recipient,
    /// Second photo: provides the face.
    Donor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Recipient => f.write_str("recipient"),
            Role::Donor => f.write_str("donor"),
        }
    }
}

/// Controller lifecycle. The last four are terminal.
///
/// `AwaitingPair` is reported by the session layer while only one photo is
/// held; `run` logs `Detecting` on entry and one terminal state on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapState {
    AwaitingPair,
    Detecting,
    Succeeded,
    NoFaceDetected,
    DimensionError,
    InternalError,
}

impl SwapState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SwapState::AwaitingPair | SwapState::Detecting)
    }
}

/// Structured failure returned instead of a composite.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwapFailure {
    #[error("no face detected in the {missing} photo")]
    NoFaceDetected { missing: Role },
    #[error("dimension error: {0}")]
    DimensionError(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl SwapFailure {
    pub fn state(&self) -> SwapState {
        match self {
            SwapFailure::NoFaceDetected { .. } => SwapState::NoFaceDetected,
            SwapFailure::DimensionError(_) => SwapState::DimensionError,
            SwapFailure::InternalError(_) => SwapState::InternalError,
        }
    }

    /// True when the user can fix it by sending a different photo.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, SwapFailure::NoFaceDetected { .. })
    }
}

/// A finished swap.
#[derive(Debug, Clone)]
pub struct CompositeResult {
    /// Same dimensions as the recipient photo.
    pub image: RgbImage,
    pub recipient_face: Face,
    pub donor_face: Face,
}

/// The compositing engine. Cheap to share behind an `Arc`; `run` takes
/// `&self` and keeps no per-call state.
pub struct SwapPipeline {
    locator: Arc<dyn FaceLocator>,
    normalizer: Box<dyn FaceNormalizer>,
    mask: MaskBuilder,
    annotator: Annotator,
}

impl SwapPipeline {
    /// Build a pipeline using the rectangular-resize normalizer.
    pub fn new(locator: Arc<dyn FaceLocator>, config: &SwapConfig) -> Result<Self, SwapError> {
        config
            .validate()
            .map_err(|e| SwapError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            locator,
            normalizer: Box::new(RectResize),
            mask: MaskBuilder::new(&config.mask),
            annotator: Annotator::new(&config.annotation),
        })
    }

    pub fn with_normalizer(mut self, normalizer: Box<dyn FaceNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn locator(&self) -> &dyn FaceLocator {
        self.locator.as_ref()
    }

    pub fn mask_builder(&self) -> &MaskBuilder {
        &self.mask
    }

    /// Swap the donor's face onto the recipient.
    pub fn run(&self, recipient: &RgbImage, donor: &RgbImage) -> Result<CompositeResult, SwapFailure> {
        let started = Instant::now();
        tracing::debug!(
            state = ?SwapState::Detecting,
            recipient = ?recipient.dimensions(),
            donor = ?donor.dimensions(),
            locator = self.locator.name(),
            normalizer = self.normalizer.name(),
            "swap started"
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_stages(recipient, donor)))
            .unwrap_or_else(|payload| Err(SwapFailure::InternalError(panic_message(payload))));

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(out) => tracing::info!(
                state = ?SwapState::Succeeded,
                region = ?out.recipient_face.region,
                elapsed_ms,
                "swap finished"
            ),
            Err(failure) if failure.is_user_correctable() => {
                tracing::warn!(state = ?failure.state(), reason = %failure, elapsed_ms, "swap finished")
            }
            Err(failure) => {
                tracing::error!(state = ?failure.state(), reason = %failure, elapsed_ms, "swap failed")
            }
        }
        result
    }

    fn run_stages(&self, recipient: &RgbImage, donor: &RgbImage) -> Result<CompositeResult, SwapFailure> {
        let recipient_face = self.locate_one(recipient, Role::Recipient)?;
        let donor_face = self.locate_one(donor, Role::Donor)?;
        let region = recipient_face.region;

        let resized = self
            .normalizer
            .normalize(donor, &donor_face, &recipient_face)
            .map_err(stage_failure)?;
        let mask = self.mask.build(region.width, region.height);
        let composite = compositor::composite(recipient, region, &resized, &mask).map_err(stage_failure)?;

        Ok(CompositeResult {
            image: self.annotator.annotate(composite),
            recipient_face,
            donor_face,
        })
    }

    fn locate_one(&self, image: &RgbImage, role: Role) -> Result<Face, SwapFailure> {
        let faces = self
            .locator
            .locate(image)
            .map_err(|e| stage_failure(SwapError::from(e)))?;
        selector::select(&faces)
            .cloned()
            .ok_or(SwapFailure::NoFaceDetected { missing: role })
    }
}

/// Fold a stage error into the caller-facing failure.
fn stage_failure(err: SwapError) -> SwapFailure {
    match err {
        SwapError::DimensionMismatch { .. } => SwapFailure::DimensionError(err.to_string()),
        other => SwapFailure::InternalError(other.to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic in swap pipeline".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::CascadeLocator;
    use crate::config::AnnotationConfig;
    use crate::locator::LocatorError;
    use crate::test_support::{paint_face, scene};
    use crate::types::Region;
    use image::Rgb;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers from a lookup on image width; counts calls.
    struct StubLocator {
        answer: fn(u32) -> Result<Vec<Face>, LocatorError>,
        calls: AtomicUsize,
    }

    impl StubLocator {
        fn new(answer: fn(u32) -> Result<Vec<Face>, LocatorError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl FaceLocator for StubLocator {
        fn locate(&self, image: &RgbImage) -> Result<Vec<Face>, LocatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.answer)(image.width())
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    /// Recipient photos are 100 wide, donors 80 wide.
    fn both_faces(width: u32) -> Result<Vec<Face>, LocatorError> {
        Ok(match width {
            100 => vec![Face::new(Region::new(20, 30, 40, 40), 1.0)],
            _ => vec![Face::new(Region::new(10, 10, 30, 30), 1.0)],
        })
    }

    fn uncaptioned() -> SwapConfig {
        SwapConfig {
            annotation: AnnotationConfig {
                lines: vec![],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn photos() -> (RgbImage, RgbImage) {
        (
            RgbImage::from_fn(100, 90, |x, y| Rgb([x as u8, y as u8, 50])),
            RgbImage::from_pixel(80, 60, Rgb([250, 10, 10])),
        )
    }

    #[test]
    fn test_success_keeps_outside_pixels() {
        let pipeline = SwapPipeline::new(StubLocator::new(both_faces), &uncaptioned()).unwrap();
        let (recipient, donor) = photos();
        let out = pipeline.run(&recipient, &donor).unwrap();

        assert_eq!(out.image.dimensions(), recipient.dimensions());
        let region = out.recipient_face.region;
        assert_eq!(region, Region::new(20, 30, 40, 40));
        for (x, y, px) in out.image.enumerate_pixels() {
            if !region.contains_point(x, y) {
                assert_eq!(px, recipient.get_pixel(x, y), "({x},{y})");
            }
        }
        // Region centre is fully donor.
        assert_eq!(out.image.get_pixel(40, 50).0, [250, 10, 10]);
    }

    #[test]
    fn test_recipient_without_face_short_circuits() {
        fn donor_only(width: u32) -> Result<Vec<Face>, LocatorError> {
            if width == 100 {
                Ok(vec![])
            } else {
                both_faces(width)
            }
        }
        let locator = StubLocator::new(donor_only);
        let pipeline = SwapPipeline::new(locator.clone(), &uncaptioned()).unwrap();
        let (recipient, donor) = photos();
        let err = pipeline.run(&recipient, &donor).unwrap_err();
        assert_eq!(err, SwapFailure::NoFaceDetected { missing: Role::Recipient });
        assert_eq!(err.state(), SwapState::NoFaceDetected);
        assert!(err.is_user_correctable());
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_donor_without_face() {
        fn recipient_only(width: u32) -> Result<Vec<Face>, LocatorError> {
            if width == 100 {
                both_faces(width)
            } else {
                Ok(vec![])
            }
        }
        let pipeline = SwapPipeline::new(StubLocator::new(recipient_only), &uncaptioned()).unwrap();
        let (recipient, donor) = photos();
        let err = pipeline.run(&recipient, &donor).unwrap_err();
        assert_eq!(err, SwapFailure::NoFaceDetected { missing: Role::Donor });
    }

    #[test]
    fn test_locator_error_is_internal() {
        fn broken(_: u32) -> Result<Vec<Face>, LocatorError> {
            Err(LocatorError::InferenceFailed("boom".into()))
        }
        let pipeline = SwapPipeline::new(StubLocator::new(broken), &uncaptioned()).unwrap();
        let (recipient, donor) = photos();
        let err = pipeline.run(&recipient, &donor).unwrap_err();
        assert!(matches!(err, SwapFailure::InternalError(ref m) if m.contains("boom")), "{err}");
        assert!(!err.is_user_correctable());
    }

    #[test]
    fn test_panic_is_contained() {
        fn panics(_: u32) -> Result<Vec<Face>, LocatorError> {
            panic!("detector exploded")
        }
        let pipeline = SwapPipeline::new(StubLocator::new(panics), &uncaptioned()).unwrap();
        let (recipient, donor) = photos();
        let err = pipeline.run(&recipient, &donor).unwrap_err();
        assert!(matches!(err, SwapFailure::InternalError(ref m) if m.contains("detector exploded")));
    }

    #[test]
    fn test_region_outside_recipient_is_internal() {
        fn off_canvas(width: u32) -> Result<Vec<Face>, LocatorError> {
            Ok(match width {
                100 => vec![Face::new(Region::new(90, 80, 40, 40), 1.0)],
                _ => vec![Face::new(Region::new(0, 0, 20, 20), 1.0)],
            })
        }
        let pipeline = SwapPipeline::new(StubLocator::new(off_canvas), &uncaptioned()).unwrap();
        let (recipient, donor) = photos();
        let err = pipeline.run(&recipient, &donor).unwrap_err();
        assert_eq!(err.state(), SwapState::InternalError);
    }

    #[test]
    fn test_normalizer_size_mismatch_is_dimension_error() {
        struct OffByOne;
        impl FaceNormalizer for OffByOne {
            fn normalize(&self, _: &RgbImage, _: &Face, recipient_face: &Face) -> Result<RgbImage, SwapError> {
                let (w, h) = recipient_face.region.dimensions();
                Ok(RgbImage::new(w + 1, h))
            }
            fn name(&self) -> &'static str {
                "off-by-one"
            }
        }
        let pipeline = SwapPipeline::new(StubLocator::new(both_faces), &uncaptioned())
            .unwrap()
            .with_normalizer(Box::new(OffByOne));
        let (recipient, donor) = photos();
        let err = pipeline.run(&recipient, &donor).unwrap_err();
        assert_eq!(err.state(), SwapState::DimensionError);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SwapConfig::default();
        config.mask.blur_kernel = 4;
        assert!(matches!(
            SwapPipeline::new(StubLocator::new(both_faces), &config),
            Err(SwapError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_states() {
        assert!(!SwapState::AwaitingPair.is_terminal());
        assert!(!SwapState::Detecting.is_terminal());
        assert!(SwapState::Succeeded.is_terminal());
        assert_eq!(SwapFailure::InternalError("x".into()).state(), SwapState::InternalError);
        assert_eq!(Role::Recipient.to_string(), "recipient");
    }

    #[test]
    fn test_cascade_swap_between_painted_faces() {
        let config = SwapConfig::default();
        let locator = Arc::new(CascadeLocator::new(config.locator.clone()));
        let pipeline = SwapPipeline::new(locator, &config).unwrap();

        let mut recipient = scene(240, 180);
        paint_face(&mut recipient, Region::new(120, 60, 72, 72));
        let mut donor = scene(200, 200);
        paint_face(&mut donor, Region::new(50, 40, 100, 100));

        let out = pipeline.run(&recipient, &donor).unwrap();
        assert_eq!(out.image.dimensions(), (240, 180));
        assert!(out.recipient_face.region.fits_within(240, 180));
        assert!(out.recipient_face.region.contains_point(156, 96));
        assert!(out.donor_face.region.contains_point(100, 90));
    }
}
