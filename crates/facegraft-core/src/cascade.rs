//! Haar-style frontal face cascade.
//!
//! Square windows slide over a luma integral image at geometrically growing
//! sizes. A window is a hit when it has enough texture and every two-box
//! contrast feature of the frontal template holds: eyes darker than the
//! nose bridge, the forehead and the cheeks; mouth darker than the nose.
//! Overlapping hits are grouped and clusters with too few members are
//! discarded, the same neighbour vote a trained Viola-Jones detector uses.

use crate::config::LocatorConfig;
use crate::locator::{ensure_min_size, FaceLocator, LocatorError};
use crate::types::{Face, Region};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};

// --- Named constants (no magic numbers) ---
const MIN_WINDOW_STDDEV: f64 = 12.0;
const MIN_CONTRAST: f64 = 0.5;
const GROUP_EPS: f32 = 0.2;

/// Box in window-relative units, 0.0..=1.0 on both axes.
#[derive(Debug, Clone, Copy)]
struct UnitBox {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

const fn unit(x0: f64, y0: f64, x1: f64, y1: f64) -> UnitBox {
    UnitBox { x0, y0, x1, y1 }
}

const LEFT_EYE: UnitBox = unit(0.20, 0.28, 0.36, 0.42);
const RIGHT_EYE: UnitBox = unit(0.64, 0.28, 0.80, 0.42);
const BRIDGE: UnitBox = unit(0.46, 0.28, 0.54, 0.42);
const FOREHEAD: UnitBox = unit(0.25, 0.06, 0.75, 0.16);
const LEFT_CHEEK: UnitBox = unit(0.14, 0.52, 0.34, 0.64);
const RIGHT_CHEEK: UnitBox = unit(0.66, 0.52, 0.86, 0.64);
const NOSE: UnitBox = unit(0.42, 0.46, 0.58, 0.56);
const MOUTH: UnitBox = unit(0.38, 0.74, 0.62, 0.82);

/// `bright` must exceed `dark` by `MIN_CONTRAST` window standard deviations.
struct Contrast {
    bright: UnitBox,
    dark: UnitBox,
}

struct Stage {
    name: &'static str,
    features: &'static [Contrast],
}

const FRONTAL_CASCADE: [Stage; 4] = [
    Stage {
        name: "eye-bridge",
        features: &[
            Contrast { bright: BRIDGE, dark: LEFT_EYE },
            Contrast { bright: BRIDGE, dark: RIGHT_EYE },
        ],
    },
    Stage {
        name: "forehead",
        features: &[
            Contrast { bright: FOREHEAD, dark: LEFT_EYE },
            Contrast { bright: FOREHEAD, dark: RIGHT_EYE },
        ],
    },
    Stage {
        name: "cheeks",
        features: &[
            Contrast { bright: LEFT_CHEEK, dark: LEFT_EYE },
            Contrast { bright: RIGHT_CHEEK, dark: RIGHT_EYE },
        ],
    },
    Stage {
        name: "mouth",
        features: &[Contrast { bright: NOSE, dark: MOUTH }],
    },
];

type SumTable = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Integral images of luma and squared luma for one frame.
struct WindowSums {
    sum: SumTable,
    sq: SumTable,
}

impl WindowSums {
    fn new(gray: &GrayImage) -> Self {
        Self {
            sum: integral_image::<_, u64>(gray),
            sq: integral_squared_image::<_, u64>(gray),
        }
    }

    /// Sums over the half-open rectangle [x0, x1) × [y0, y1).
    fn rect(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> (u64, u64) {
        let pick = |t: &SumTable| sum_image_pixels(t, x0, y0, x1 - 1, y1 - 1)[0];
        (pick(&self.sum), pick(&self.sq))
    }

    fn box_mean(&self, x: u32, y: u32, side: u32, b: &UnitBox) -> f64 {
        let side_f = side as f64;
        let x0 = x + (b.x0 * side_f).floor() as u32;
        let y0 = y + (b.y0 * side_f).floor() as u32;
        let x1 = (x + (b.x1 * side_f).ceil() as u32).max(x0 + 1);
        let y1 = (y + (b.y1 * side_f).ceil() as u32).max(y0 + 1);
        let (total, _) = self.rect(x0, y0, x1, y1);
        total as f64 / ((x1 - x0) as f64 * (y1 - y0) as f64)
    }
}

/// Sliding-window frontal face detector with no model file.
pub struct CascadeLocator {
    config: LocatorConfig,
}

impl CascadeLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Run the cascade on one window; returns the rejecting stage on failure.
    fn evaluate(&self, ii: &WindowSums, x: u32, y: u32, side: u32) -> Result<(), &'static str> {
        let (total, total_sq) = ii.rect(x, y, x + side, y + side);
        let area = side as f64 * side as f64;
        let mean = total as f64 / area;
        let stddev = (total_sq as f64 / area - mean * mean).max(0.0).sqrt();
        if stddev < MIN_WINDOW_STDDEV {
            return Err("variance");
        }

        for stage in &FRONTAL_CASCADE {
            for feature in stage.features {
                let bright = ii.box_mean(x, y, side, &feature.bright);
                let dark = ii.box_mean(x, y, side, &feature.dark);
                if (bright - dark) / stddev < MIN_CONTRAST {
                    return Err(stage.name);
                }
            }
        }
        Ok(())
    }

    /// Collect every accepted window across all scales.
    fn scan(&self, gray: &GrayImage) -> Vec<Region> {
        let (width, height) = gray.dimensions();
        let ii = WindowSums::new(gray);
        let max_side = width.min(height);

        let mut hits = Vec::new();
        let mut window = self.config.min_face_size as f32;
        while (window.round() as u32) <= max_side {
            let side = window.round() as u32;
            let step = ((side as f32 * self.config.window_stride).round() as u32).max(1);

            let mut y = 0;
            while y + side <= height {
                let mut x = 0;
                while x + side <= width {
                    if self.evaluate(&ii, x, y, side).is_ok() {
                        hits.push(Region::new(x, y, side, side));
                    }
                    x += step;
                }
                y += step;
            }

            window *= self.config.scale_factor;
        }
        hits
    }
}

impl FaceLocator for CascadeLocator {
    fn locate(&self, image: &RgbImage) -> Result<Vec<Face>, LocatorError> {
        ensure_min_size(image)?;
        let gray = image::imageops::grayscale(image);
        let hits = self.scan(&gray);
        let faces = group_windows(&hits, self.config.min_neighbors, GROUP_EPS);
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            hits = hits.len(),
            faces = faces.len(),
            "cascade locate"
        );
        Ok(faces)
    }

    fn name(&self) -> &'static str {
        "cascade"
    }
}

/// Rectangle similarity used for grouping (OpenCV `SimilarRects`).
fn similar(a: &Region, b: &Region, eps: f32) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f32 * 0.5;
    let close = |p: u32, q: u32| (p as f32 - q as f32).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Partition hits into clusters of similar rectangles and average each one.
///
/// Clusters with fewer than `min_neighbors` members are dropped. Edges are
/// averaged, not widths, so a cluster never reaches past its members. The
/// result is ordered by member count, descending; equal counts keep the order in
/// which their first member was found.
fn group_windows(hits: &[Region], min_neighbors: u32, eps: f32) -> Vec<Face> {
    let mut parent: Vec<usize> = (0..hits.len()).collect();
    for i in 0..hits.len() {
        for j in 0..i {
            if similar(&hits[i], &hits[j], eps) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    // Accumulate per root, in order of the root's first appearance.
    let mut roots: Vec<usize> = Vec::new();
    let mut sums: Vec<[u64; 5]> = Vec::new();
    for i in 0..hits.len() {
        let root = find(&mut parent, i);
        let slot = match roots.iter().position(|&r| r == root) {
            Some(slot) => slot,
            None => {
                roots.push(root);
                sums.push([0; 5]);
                sums.len() - 1
            }
        };
        let r = &hits[i];
        let acc = &mut sums[slot];
        acc[0] += r.x as u64;
        acc[1] += r.y as u64;
        acc[2] += (r.x + r.width) as u64;
        acc[3] += (r.y + r.height) as u64;
        acc[4] += 1;
    }

    let mut faces: Vec<Face> = sums
        .iter()
        .filter(|acc| acc[4] >= min_neighbors as u64)
        .map(|acc| {
            let n = acc[4] as f64;
            let avg = |v: u64| (v as f64 / n).round() as u32;
            let (left, top, right, bottom) = (avg(acc[0]), avg(acc[1]), avg(acc[2]), avg(acc[3]));
            Face::new(
                Region::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top)),
                acc[4] as f32,
            )
        })
        .collect();

    faces.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    faces
}
