//! Synthetic scenes for unit tests.

use crate::types::Region;
use image::{Rgb, RgbImage};

pub const BACKGROUND: Rgb<u8> = Rgb([40, 40, 60]);
pub const SKIN: Rgb<u8> = Rgb([210, 170, 150]);
pub const EYE: Rgb<u8> = Rgb([30, 30, 30]);
pub const MOUTH: Rgb<u8> = Rgb([120, 40, 50]);

pub fn scene(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, BACKGROUND)
}

fn fill(img: &mut RgbImage, face: Region, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgb<u8>) {
    let (w, h) = (face.width as f32, face.height as f32);
    let left = face.x + (x0 * w).round() as u32;
    let top = face.y + (y0 * h).round() as u32;
    let right = face.x + (x1 * w).round() as u32;
    let bottom = face.y + (y1 * h).round() as u32;
    for y in top..bottom {
        for x in left..right {
            img.put_pixel(x, y, color);
        }
    }
}

/// Paint a frontal "face": skin block, two dark eyes, a dark mouth.
pub fn paint_face(img: &mut RgbImage, face: Region) {
    fill(img, face, 0.0, 0.0, 1.0, 1.0, SKIN);
    fill(img, face, 0.15, 0.22, 0.40, 0.46, EYE);
    fill(img, face, 0.60, 0.22, 0.85, 0.46, EYE);
    fill(img, face, 0.34, 0.68, 0.66, 0.86, MOUTH);
}
