//! Geometric normalization: bring donor face pixels to the recipient's size.
//!
//! The baseline strategy stretches the donor box to the recipient box with
//! no further padding or cropping, so aspect distortion is expected. The
//! landmark strategy aligns keypoints instead when both faces carry them.

use crate::alignment::{estimate_similarity, warp_affine};
use crate::error::SwapError;
use crate::types::{Face, Region};
use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Produces donor pixels sized exactly to the recipient face region.
pub trait FaceNormalizer: Send + Sync {
    fn normalize(&self, donor: &RgbImage, donor_face: &Face, recipient_face: &Face) -> Result<RgbImage, SwapError>;

    fn name(&self) -> &'static str;
}

/// Crop `region` out of `donor` and resize it bilinearly to exactly
/// `target_width`×`target_height`.
pub fn normalize(
    donor: &RgbImage,
    region: Region,
    target_width: u32,
    target_height: u32,
) -> Result<RgbImage, SwapError> {
    ensure_region(donor, region)?;
    if target_width == 0 || target_height == 0 {
        return Err(SwapError::DimensionMismatch {
            what: "normalization target",
            expected: (region.width, region.height),
            actual: (target_width, target_height),
        });
    }

    let crop = image::imageops::crop_imm(donor, region.x, region.y, region.width, region.height).to_image();
    if crop.dimensions() == (target_width, target_height) {
        return Ok(crop);
    }
    Ok(image::imageops::resize(&crop, target_width, target_height, FilterType::Triangle))
}

fn ensure_region(image: &RgbImage, region: Region) -> Result<(), SwapError> {
    let (width, height) = image.dimensions();
    if !region.fits_within(width, height) {
        return Err(SwapError::InvalidRegion { region, width, height });
    }
    Ok(())
}

/// Stretch the donor box to the recipient box.
#[derive(Debug, Clone, Copy, Default)]
pub struct RectResize;

impl FaceNormalizer for RectResize {
    fn normalize(&self, donor: &RgbImage, donor_face: &Face, recipient_face: &Face) -> Result<RgbImage, SwapError> {
        let (w, h) = recipient_face.region.dimensions();
        normalize(donor, donor_face.region, w, h)
    }

    fn name(&self) -> &'static str {
        "rect"
    }
}

/// Warp the donor so its keypoints land on the recipient's keypoints.
///
/// Falls back to [`RectResize`] when either face lacks landmarks or the
/// keypoints are degenerate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LandmarkWarp;

impl FaceNormalizer for LandmarkWarp {
    fn normalize(&self, donor: &RgbImage, donor_face: &Face, recipient_face: &Face) -> Result<RgbImage, SwapError> {
        ensure_region(donor, donor_face.region)?;
        let target = recipient_face.region;

        if let (Some(src), Some(dst)) = (&donor_face.landmarks, &recipient_face.landmarks) {
            // Recipient keypoints relative to the region we are filling.
            let local = dst.map(|(x, y)| (x - target.x as f32, y - target.y as f32));
            let warped = estimate_similarity(src, &local)
                .and_then(|m| warp_affine(donor, &m, target.width, target.height));
            if let Some(img) = warped {
                return Ok(img);
            }
            tracing::debug!("degenerate landmarks; using rectangular resize");
        } else {
            tracing::debug!("landmarks unavailable; using rectangular resize");
        }

        RectResize.normalize(donor, donor_face, recipient_face)
    }

    fn name(&self) -> &'static str {
        "landmark"
    }
}

/// Which normalizer the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizerKind {
    #[default]
    Rect,
    Landmark,
}

impl NormalizerKind {
    pub fn build(self) -> Box<dyn FaceNormalizer> {
        match self {
            Self::Rect => Box::new(RectResize),
            Self::Landmark => Box::new(LandmarkWarp),
        }
    }
}

impl FromStr for NormalizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rect" | "resize" => Ok(Self::Rect),
            "landmark" | "landmarks" | "warp" => Ok(Self::Landmark),
            other => Err(format!("unknown alignment '{other}' (expected rect or landmark)")),
        }
    }
}
