use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
pub type Landmarks = [(f32, f32); 5];

/// Axis-aligned rectangle inside an image, in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True when the region is non-empty and lies fully inside a
    /// `width`×`height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        match (self.x.checked_add(self.width), self.y.checked_add(self.height)) {
            (Some(right), Some(bottom)) => right <= width && bottom <= height,
            _ => false,
        }
    }

    /// True when pixel (`px`, `py`) lies inside the region.
    pub fn contains_point(&self, px: u32, py: u32) -> bool {
        px >= self.x
            && py >= self.y
            && (px - self.x) < self.width
            && (py - self.y) < self.height
    }

    /// Build a region from a floating-point box, clipped to the image.
    ///
    /// Returns `None` when nothing of the box survives clipping.
    pub fn from_bbox_clamped(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        image_width: u32,
        image_height: u32,
    ) -> Option<Self> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return None;
        }
        let x0 = x.round().clamp(0.0, image_width as f32) as u32;
        let y0 = y.round().clamp(0.0, image_height as f32) as u32;
        let x1 = (x + width).round().clamp(0.0, image_width as f32) as u32;
        let y1 = (y + height).round().clamp(0.0, image_height as f32) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Intersection-over-Union with another region.
    pub fn iou(&self, other: &Region) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let inter = x2.saturating_sub(x1) as u64 * y2.saturating_sub(y1) as u64;
        let union = self.area() + other.area() - inter;
        if union > 0 {
            inter as f32 / union as f32
        } else {
            0.0
        }
    }
}

/// One face candidate produced by a locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub region: Region,
    /// Detector-specific score: neighbour count for the cascade, model
    /// probability for SCRFD.
    pub confidence: f32,
    /// Keypoints in image coordinates, when the detector yields them.
    pub landmarks: Option<Landmarks>,
}

impl Face {
    pub fn new(region: Region, confidence: f32) -> Self {
        Self {
            region,
            confidence,
            landmarks: None,
        }
    }

    pub fn with_landmarks(mut self, landmarks: Landmarks) -> Self {
        self.landmarks = Some(landmarks);
        self
    }
}

/// Single-channel alpha grid with values in [0.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl Mask {
    /// Build a mask by evaluating `f` at every pixel; results are clamped to [0, 1].
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                values.push(f(x, y).clamp(0.0, 1.0));
            }
        }
        Self {
            width,
            height,
            values,
        }
    }

    /// Uniform mask, e.g. all-zero or all-one.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value.clamp(0.0, 1.0); width as usize * height as usize],
        }
    }

    pub(crate) fn from_raw(width: u32, height: u32, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), width as usize * height as usize);
        Self {
            width,
            height,
            values,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Render as an 8-bit greyscale image (0.0 → black, 1.0 → white).
    pub fn to_luma8(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([(self.get(x, y) * 255.0).round().clamp(0.0, 255.0) as u8])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_area_and_fit() {
        let r = Region::new(10, 20, 30, 40);
        assert_eq!(r.area(), 1200);
        assert!(r.fits_within(40, 60));
        assert!(!r.fits_within(39, 60));
        assert!(!r.fits_within(40, 59));
    }

    #[test]
    fn test_region_empty_never_fits() {
        assert!(!Region::new(0, 0, 0, 10).fits_within(100, 100));
        assert!(!Region::new(0, 0, 10, 0).fits_within(100, 100));
    }

    #[test]
    fn test_region_overflow_does_not_fit() {
        let r = Region::new(u32::MAX - 1, 0, 10, 10);
        assert!(!r.fits_within(u32::MAX, 100));
    }

    #[test]
    fn test_from_bbox_clamped() {
        let r = Region::from_bbox_clamped(-5.0, 10.2, 50.0, 30.0, 40, 100).unwrap();
        assert_eq!(r, Region::new(0, 10, 40, 30));
        assert!(Region::from_bbox_clamped(200.0, 0.0, 10.0, 10.0, 100, 100).is_none());
        assert!(Region::from_bbox_clamped(f32::NAN, 0.0, 10.0, 10.0, 100, 100).is_none());
    }

    #[test]
    fn test_region_iou() {
        let a = Region::new(0, 0, 10, 10);
        let b = Region::new(5, 0, 10, 10);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&Region::new(20, 20, 5, 5)), 0.0);
    }

    #[test]
    fn test_contains_point() {
        let r = Region::new(2, 3, 4, 5);
        assert!(r.contains_point(2, 3));
        assert!(r.contains_point(5, 7));
        assert!(!r.contains_point(6, 7));
        assert!(!r.contains_point(1, 3));
    }

    #[test]
    fn test_face_json_shape() {
        let face = Face::new(Region::new(1, 2, 3, 4), 7.0);
        let json = serde_json::to_value(&face).unwrap();
        assert_eq!(json["region"]["width"], 3);
        assert_eq!(json["confidence"], 7.0);
        assert!(json["landmarks"].is_null());
    }

    #[test]
    fn test_mask_clamps_values() {
        let m = Mask::from_fn(2, 1, |x, _| if x == 0 { -1.0 } else { 2.0 });
        assert_eq!(m.values(), &[0.0, 1.0]);
    }

    #[test]
    fn test_mask_to_luma8() {
        let m = Mask::from_fn(2, 1, |x, _| x as f32);
        let img = m.to_luma8();
        assert_eq!(img.get_pixel(0, 0).0, [0]);
        assert_eq!(img.get_pixel(1, 0).0, [255]);
    }
}
