//! SCRFD landmark face detector via ONNX Runtime.
//!
//! Implements the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model with 3-stride anchor-free decoding and NMS post-processing.
//! Besides boxes it yields five facial keypoints per face, which the
//! landmark-aligned normalizer uses.

use crate::config::LocatorConfig;
use crate::locator::{ensure_min_size, FaceLocator, LocatorError};
use crate::types::{Face, Landmarks, Region};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::sync::Mutex;

// --- Named constants (no magic numbers) ---
const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// Decoded box in original-image coordinates, before clipping.
#[derive(Debug, Clone)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    landmarks: Option<Landmarks>,
}

/// SCRFD-based face locator.
///
/// The ONNX session needs exclusive access per run, so it sits behind a
/// mutex; concurrent swaps serialize only on inference.
pub struct ScrfdLocator {
    session: Mutex<Session>,
    config: LocatorConfig,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl ScrfdLocator {
    /// Load the SCRFD model from its serialized ONNX bytes.
    pub fn from_bytes(model: &[u8], config: LocatorConfig) -> Result<Self, LocatorError> {
        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_memory(model)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        let num_outputs = output_names.len();

        tracing::info!(
            bytes = model.len(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if num_outputs < 9 {
            return Err(LocatorError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {num_outputs}"
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session: Mutex::new(session),
            config,
            stride_indices,
        })
    }

    /// Preprocess an RGB image into a NCHW float tensor with letterbox padding.
    ///
    /// Padding is left at zero, which is what SCRFD_MEAN normalizes to.
    fn preprocess(image: &RgbImage) -> (Array4<f32>, LetterboxInfo) {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let scale_w = SCRFD_INPUT_SIZE as f32 / width as f32;
        let scale_h = SCRFD_INPUT_SIZE as f32 / height as f32;
        let scale = scale_w.min(scale_h);

        let new_w = ((width as f32 * scale).round() as usize).clamp(1, SCRFD_INPUT_SIZE);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, SCRFD_INPUT_SIZE);
        let pad_x = (SCRFD_INPUT_SIZE - new_w) as f32 / 2.0;
        let pad_y = (SCRFD_INPUT_SIZE - new_h) as f32 / 2.0;

        let resized = image::imageops::resize(image, new_w as u32, new_h as u32, FilterType::Triangle);

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (tx, ty) = (x as usize + pad_x_start, y as usize + pad_y_start);
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = (pixel.0[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (tensor, LetterboxInfo { scale, pad_x, pad_y })
    }
}

impl FaceLocator for ScrfdLocator {
    fn locate(&self, image: &RgbImage) -> Result<Vec<Face>, LocatorError> {
        ensure_min_size(image)?;
        let (input, letterbox) = Self::preprocess(image);

        let mut session = self
            .session
            .lock()
            .map_err(|_| LocatorError::InferenceFailed("SCRFD session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| LocatorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| LocatorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| LocatorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                kps,
                stride,
                &letterbox,
                self.config.min_confidence,
            ));
        }

        let faces = to_faces(
            nms(candidates, SCRFD_NMS_THRESHOLD),
            image.width(),
            image.height(),
            self.config.min_face_size,
        );
        tracing::debug!(faces = faces.len(), "scrfd locate");
        Ok(faces)
    }

    fn name(&self) -> &'static str {
        "scrfd"
    }
}

/// Discover output tensor ordering by name.
///
/// SCRFD exports name tensors either "score_8", "bbox_16", ... or with
/// generic numbers. Named outputs are mapped to stride slots; otherwise the
/// standard positional ordering is assumed:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
///   [6-8] = kps    (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let mut named = [(0, 0, 0); 3];
    for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride), find("kps", stride)) {
            (Some(s), Some(b), Some(k)) => named[slot] = (s, b, k),
            _ => {
                tracing::info!(
                    ?names,
                    "SCRFD: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes, [6-8]=kps"
                );
                return [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
            }
        }
    }
    named
}

/// Decode candidates for a single stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<Candidate> {
    let grid = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let unmap = |vx: f32, vy: f32| {
        (
            (vx - letterbox.pad_x) / letterbox.scale,
            (vy - letterbox.pad_y) / letterbox.scale,
        )
    };

    let mut out = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = ((anchor_idx % grid) * stride) as f32;
        let anchor_cy = ((anchor_idx / grid) * stride) as f32;
        let s = stride as f32;

        let Some(b) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let (x1, y1) = unmap(anchor_cx - b[0] * s, anchor_cy - b[1] * s);
        let (x2, y2) = unmap(anchor_cx + b[2] * s, anchor_cy + b[3] * s);

        let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| unmap(anchor_cx + k[i * 2] * s, anchor_cy + k[i * 2 + 1] * s))
        });

        out.push(Candidate {
            x1,
            y1,
            x2,
            y2,
            score,
            landmarks,
        });
    }
    out
}

/// Non-Maximum Suppression: keep the best-scoring of overlapping candidates.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    let union = (a.x2 - a.x1) * (a.y2 - a.y1) + (b.x2 - b.x1) * (b.y2 - b.y1) - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Clip candidates into the image and drop those below the minimum face size.
fn to_faces(candidates: Vec<Candidate>, width: u32, height: u32, min_face_size: u32) -> Vec<Face> {
    candidates
        .into_iter()
        .filter_map(|c| {
            let region = Region::from_bbox_clamped(c.x1, c.y1, c.x2 - c.x1, c.y2 - c.y1, width, height)?;
            if region.width.min(region.height) < min_face_size {
                return None;
            }
            let face = Face::new(region, c.score);
            Some(match c.landmarks {
                Some(lms) => face.with_landmarks(lms),
                None => face,
            })
        })
        .collect()
}
