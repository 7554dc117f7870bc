//! Alpha-blend normalized donor pixels into the recipient region.

use crate::error::SwapError;
use crate::types::{Mask, Region};
use image::RgbImage;

/// Blend `donor` into a copy of `recipient` at `region`, weighted by `mask`.
///
/// Inside the region each channel becomes
/// `recipient * (1 - alpha) + donor * alpha`, rounded to the nearest
/// integer. Pixels outside the region are copied unchanged. `donor` and
/// `mask` must both match the region's dimensions exactly.
pub fn composite(recipient: &RgbImage, region: Region, donor: &RgbImage, mask: &Mask) -> Result<RgbImage, SwapError> {
    let (width, height) = recipient.dimensions();
    if !region.fits_within(width, height) {
        return Err(SwapError::InvalidRegion { region, width, height });
    }
    if donor.dimensions() != region.dimensions() {
        return Err(SwapError::DimensionMismatch {
            what: "resized donor",
            expected: region.dimensions(),
            actual: donor.dimensions(),
        });
    }
    if mask.dimensions() != region.dimensions() {
        return Err(SwapError::DimensionMismatch {
            what: "mask",
            expected: region.dimensions(),
            actual: mask.dimensions(),
        });
    }

    let mut out = recipient.clone();
    for (dx, dy, src) in donor.enumerate_pixels() {
        let alpha = mask.get(dx, dy);
        if alpha <= 0.0 {
            continue;
        }
        let dst = out.get_pixel_mut(region.x + dx, region.y + dy);
        for c in 0..3 {
            let blended = dst.0[c] as f32 * (1.0 - alpha) + src.0[c] as f32 * alpha;
            dst.0[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}
