//! Caption overlay stamped on every composite.

use crate::config::AnnotationConfig;
use crate::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::types::Region;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

/// Screen pixels per font pixel.
pub const SCALE: u32 = 2;

const ADVANCE: u32 = (GLYPH_WIDTH + 1) * SCALE;
const LINE_HEIGHT: u32 = (GLYPH_HEIGHT + 3) * SCALE;
const SHADOW_OFFSET: u32 = SCALE;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const SHADOW_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

#[derive(Debug, Clone)]
pub struct Annotator {
    lines: Vec<String>,
    x: u32,
    y: u32,
}

impl Annotator {
    pub fn new(config: &AnnotationConfig) -> Self {
        Self {
            lines: config.lines.clone(),
            x: config.x,
            y: config.y,
        }
    }

    /// Draw the caption onto `image` and hand it back.
    ///
    /// White text over a one-font-pixel black drop shadow. Anything past
    /// the image edge is clipped.
    pub fn annotate(&self, mut image: RgbImage) -> RgbImage {
        for (row, line) in self.lines.iter().enumerate() {
            let top = self.y as i64 + row as i64 * LINE_HEIGHT as i64;
            let left = self.x as i64;
            draw_text(&mut image, left + SHADOW_OFFSET as i64, top + SHADOW_OFFSET as i64, line, SHADOW_COLOR);
            draw_text(&mut image, left, top, line, TEXT_COLOR);
        }
        image
    }

    /// Area the caption may touch, shadow included, in image coordinates.
    /// `None` when there is nothing to draw.
    pub fn bounds(&self) -> Option<Region> {
        let longest = self.lines.iter().map(|l| l.chars().count() as u32).max()?;
        if longest == 0 {
            return None;
        }
        let rows = self.lines.len() as u32;
        Some(Region::new(
            self.x,
            self.y,
            longest * ADVANCE + SHADOW_OFFSET,
            (rows - 1) * LINE_HEIGHT + GLYPH_HEIGHT * SCALE + SHADOW_OFFSET,
        ))
    }
}

fn draw_text(image: &mut RgbImage, x: i64, y: i64, text: &str, color: Rgb<u8>) {
    for (i, ch) in text.chars().enumerate() {
        let rows = font::glyph(ch).unwrap_or(font::REPLACEMENT);
        let gx = x + i as i64 * ADVANCE as i64;
        for (r, bits) in rows.iter().enumerate() {
            for c in 0..GLYPH_WIDTH {
                if *bits & (1u8 << (GLYPH_WIDTH - 1 - c)) == 0 {
                    continue;
                }
                let px = gx + (c * SCALE) as i64;
                let py = y + r as i64 * SCALE as i64;
                if let (Ok(px), Ok(py)) = (i32::try_from(px), i32::try_from(py)) {
                    draw_filled_rect_mut(image, Rect::at(px, py).of_size(SCALE, SCALE), color);
                }
            }
        }
    }
}
