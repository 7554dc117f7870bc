//! Landmark alignment via 4-DOF similarity transform.
//!
//! Estimates scale, rotation and translation mapping one set of five facial
//! keypoints onto another by least squares, then resamples an RGB image
//! through the inverse transform.

use crate::types::Landmarks;
use image::{Rgb, RgbImage};

/// 2×3 similarity matrix `[a, -b, tx, b, a, ty]`:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
pub type Similarity = [f32; 6];

/// Estimate the similarity transform taking `src` landmarks onto `dst`.
///
/// Returns `None` when the system is degenerate (e.g. coincident points).
pub fn estimate_similarity(src: &Landmarks, dst: &Landmarks) -> Option<Similarity> {
    // Overdetermined system A * [a, b, tx, ty]^T = B, two rows per point:
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [[0.0f64; 4]; 4];
    let mut atb = [0.0f64; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let (sx, sy, dx, dy) = (sx as f64, sy as f64, dx as f64, dy as f64);
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];
        for j in 0..4 {
            for k in 0..4 {
                ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(ata, atb)?;
    let (a, b, tx, ty) = (a as f32, b as f32, tx as f32, ty as f32);
    Some([a, -b, tx, b, a, ty])
}

/// Solve a 4×4 linear system via Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(a: [[f64; 4]; 4], b: [f64; 4]) -> Option<[f64; 4]> {
    let mut m = [[0.0f64; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&a[i]);
        m[i][4] = b[i];
    }

    for col in 0..4 {
        let pivot_row = (col..4).max_by(|&p, &q| m[p][col].abs().total_cmp(&m[q][col].abs()))?;
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-9 {
            return None;
        }
        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f64; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }
    Some(x)
}

/// Resample `src` through `matrix` into an `out_width`×`out_height` image.
///
/// Each output pixel is mapped back into the source with the inverse
/// transform and sampled bilinearly. Coordinates outside the source are
/// clamped to the nearest edge pixel so no black border is introduced.
pub fn warp_affine(src: &RgbImage, matrix: &Similarity, out_width: u32, out_height: u32) -> Option<RgbImage> {
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);

    // Inverse of [[a, -b], [b, a]] is [[a, b], [-b, a]] / (a² + b²).
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return None;
    }
    let ia = a / det;
    let ib = b / det;

    let max_x = src.width() as i64 - 1;
    let max_y = src.height() as i64 - 1;
    let sample = |x: i64, y: i64| src.get_pixel(x.clamp(0, max_x) as u32, y.clamp(0, max_y) as u32).0;

    let out = RgbImage::from_fn(out_width, out_height, |ox, oy| {
        let dx = ox as f32 - tx;
        let dy = oy as f32 - ty;
        let sx = ia * dx + ib * dy;
        let sy = -ib * dx + ia * dy;

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let (tl, tr) = (sample(x0, y0), sample(x0 + 1, y0));
        let (bl, br) = (sample(x0, y0 + 1), sample(x0 + 1, y0 + 1));

        let mut px = [0u8; 3];
        for c in 0..3 {
            let val = tl[c] as f32 * (1.0 - fx) * (1.0 - fy)
                + tr[c] as f32 * fx * (1.0 - fy)
                + bl[c] as f32 * (1.0 - fx) * fy
                + br[c] as f32 * fx * fy;
            px[c] = val.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(px)
    });
    Some(out)
}
