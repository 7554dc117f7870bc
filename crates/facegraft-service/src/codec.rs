//! Wire-format edge: compressed bytes in, compressed bytes out.

use image::{ImageFormat, ImageResult, RgbImage};
use std::io::Cursor;

/// Decode any format the `image` crate recognizes into 8-bit RGB.
/// Alpha is dropped and greyscale is expanded.
pub fn decode_photo(bytes: &[u8]) -> ImageResult<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

pub fn encode_png(image: &RgbImage) -> ImageResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
