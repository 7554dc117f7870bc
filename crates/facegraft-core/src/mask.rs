//! Feathered elliptical alpha masks.
//!
//! The mask is a filled ellipse inscribed in the target rectangle (1.0
//! inside, 0.0 outside) smoothed with a square Gaussian kernel, so the
//! transplanted face fades into the recipient instead of ending in a seam.

use crate::config::MaskConfig;
use crate::types::Mask;
use image::{ImageBuffer, Luma};
use imageproc::drawing::draw_filled_ellipse_mut;
use imageproc::filter::separable_filter_equal;

/// Float canvas the mask is drawn and blurred on.
type AlphaImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Builds masks for a fixed blur kernel size.
#[derive(Debug, Clone)]
pub struct MaskBuilder {
    kernel: Vec<f32>,
}

impl Default for MaskBuilder {
    fn default() -> Self {
        Self::new(&MaskConfig::default())
    }
}

impl MaskBuilder {
    /// `config.blur_kernel` is expected to be odd (see [`MaskConfig::validate`]);
    /// an even size is rounded up to the next odd one.
    pub fn new(config: &MaskConfig) -> Self {
        Self {
            kernel: gaussian_kernel(config.blur_kernel.max(1) | 1),
        }
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel.len()
    }

    /// Feathered mask for a `width`×`height` region. Pure: identical inputs
    /// give bit-identical masks.
    pub fn build(&self, width: u32, height: u32) -> Mask {
        if width == 0 || height == 0 {
            return Mask::filled(width, height, 0.0);
        }
        let soft = separable_filter_equal(&ellipse_image(width, height), &self.kernel);
        into_mask(soft)
    }
}

/// Hard-edged ellipse inscribed in a `width`×`height` rectangle, touching
/// the centres of the outermost pixels.
pub fn ellipse(width: u32, height: u32) -> Mask {
    if width == 0 || height == 0 {
        return Mask::filled(width, height, 0.0);
    }
    into_mask(ellipse_image(width, height))
}

/// Drawn on a half-pixel grid so even sides stay centred: pixel (x, y) is
/// sample (2x, 2y) of a (2w-1)×(2h-1) canvas.
fn ellipse_image(width: u32, height: u32) -> AlphaImage {
    let mut fine = AlphaImage::new(2 * width - 1, 2 * height - 1);
    let (rx, ry) = ((width - 1) as i32, (height - 1) as i32);
    draw_filled_ellipse_mut(&mut fine, (rx, ry), rx, ry, Luma([1.0]));
    AlphaImage::from_fn(width, height, |x, y| *fine.get_pixel(2 * x, 2 * y))
}

fn into_mask(image: AlphaImage) -> Mask {
    let (width, height) = image.dimensions();
    let values = image.into_raw().into_iter().map(|v| v.clamp(0.0, 1.0)).collect();
    Mask::from_raw(width, height, values)
}

/// Normalized 1-D Gaussian of odd length `size`.
///
/// Sigma follows the usual rule for a kernel given only by its size:
/// `0.3 * ((size - 1) / 2 - 1) + 0.8`.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let radius = (size / 2) as i64;
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / total) as f32).collect()
}
