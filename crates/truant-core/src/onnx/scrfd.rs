//! SCRFD face detector: anchor-free decoding over three stride levels plus
//! NMS, with letterbox preprocessing. Detections without usable landmarks
//! are dropped — downstream alignment and pose gating both need the five
//! points.

use super::gray_to_nchw;
use crate::oracle::OracleError;
use crate::types::{BoundingBox, Landmarks};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const INPUT_SIZE: usize = 640;
const MEAN: f32 = 127.5;
const STD: f32 = 128.0;
const CONFIDENCE_THRESHOLD: f32 = 0.5;
const NMS_IOU: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// Output tensor slots for one stride level: (scores, boxes, landmarks).
type LevelSlots = (usize, usize, usize);

/// Letterbox geometry for mapping model coordinates back to the frame.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub(crate) struct Scrfd {
    session: Session,
    slots: [LevelSlots; 3],
}

impl Scrfd {
    pub fn load(model_path: &str) -> Result<Self, OracleError> {
        if !Path::new(model_path).exists() {
            return Err(OracleError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(OracleError::Inference(format!(
                "SCRFD model must expose 9 outputs (3 strides x score/bbox/kps), got {}",
                names.len()
            )));
        }

        let slots = map_output_slots(&names);
        tracing::info!(path = model_path, outputs = ?names, ?slots, "SCRFD detector loaded");

        Ok(Self { session, slots })
    }

    /// Detect faces in a grayscale frame; results are sorted by confidence,
    /// in frame coordinates.
    pub fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<(BoundingBox, Landmarks)>, OracleError> {
        let (tensor, letterbox) = preprocess(gray, width as usize, height as usize);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;

        let mut candidates = Vec::new();
        for (level, &stride) in STRIDES.iter().enumerate() {
            let (score_slot, bbox_slot, kps_slot) = self.slots[level];
            let (_, scores) = outputs[score_slot]
                .try_extract_tensor::<f32>()
                .map_err(|e| OracleError::Inference(format!("scores, stride {stride}: {e}")))?;
            let (_, boxes) = outputs[bbox_slot]
                .try_extract_tensor::<f32>()
                .map_err(|e| OracleError::Inference(format!("boxes, stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_slot]
                .try_extract_tensor::<f32>()
                .map_err(|e| OracleError::Inference(format!("landmarks, stride {stride}: {e}")))?;

            decode_level(scores, boxes, kps, stride, &letterbox, &mut candidates);
        }

        let mut kept = nms(candidates, NMS_IOU);
        kept.sort_by(|a, b| {
            b.0.confidence
                .partial_cmp(&a.0.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(kept)
    }
}

/// Resolve which output tensor belongs to which stride level.
///
/// Insightface exports name them `score_8`, `bbox_16`, `kps_32`, ...; other
/// exports use opaque numeric names, for which the conventional positional
/// layout applies: [0-2] scores, [3-5] boxes, [6-8] landmarks.
fn map_output_slots(names: &[String]) -> [LevelSlots; 3] {
    let find = |prefix: &str, stride: usize| names.iter().position(|n| n == &format!("{prefix}_{stride}"));

    let all_named = STRIDES.iter().all(|&s| {
        find("score", s).is_some() && find("bbox", s).is_some() && find("kps", s).is_some()
    });

    if all_named {
        std::array::from_fn(|i| {
            let s = STRIDES[i];
            (
                find("score", s).unwrap(),
                find("bbox", s).unwrap(),
                find("kps", s).unwrap(),
            )
        })
    } else {
        [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
    }
}

/// Letterbox the frame into the 640x640 model input: scale to fit, center,
/// pad with the mean value (which normalizes to zero).
fn preprocess(gray: &[u8], width: usize, height: usize) -> (ndarray::Array4<f32>, Letterbox) {
    let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
    let new_w = (width as f32 * scale).round() as usize;
    let new_h = (height as f32 * scale).round() as usize;
    let pad_x = ((INPUT_SIZE - new_w) / 2) as f32;
    let pad_y = ((INPUT_SIZE - new_h) / 2) as f32;

    let resized = resize_bilinear(gray, width, height, new_w, new_h);

    let mut canvas = vec![MEAN as u8; INPUT_SIZE * INPUT_SIZE];
    let (x0, y0) = (pad_x as usize, pad_y as usize);
    for row in 0..new_h {
        let src = &resized[row * new_w..(row + 1) * new_w];
        let dst_off = (y0 + row) * INPUT_SIZE + x0;
        canvas[dst_off..dst_off + new_w].copy_from_slice(src);
    }

    let tensor = gray_to_nchw(&canvas, INPUT_SIZE, MEAN, STD);
    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Bilinear grayscale resize with half-pixel centers.
fn resize_bilinear(src: &[u8], sw: usize, sh: usize, dw: usize, dh: usize) -> Vec<u8> {
    let mut out = vec![0u8; dw * dh];
    let sx_ratio = sw as f32 / dw as f32;
    let sy_ratio = sh as f32 / dh as f32;

    for y in 0..dh {
        let fy = ((y as f32 + 0.5) * sy_ratio - 0.5).max(0.0);
        let y0 = (fy as usize).min(sh - 1);
        let y1 = (y0 + 1).min(sh - 1);
        let wy = fy - y0 as f32;

        for x in 0..dw {
            let fx = ((x as f32 + 0.5) * sx_ratio - 0.5).max(0.0);
            let x0 = (fx as usize).min(sw - 1);
            let x1 = (x0 + 1).min(sw - 1);
            let wx = fx - x0 as f32;

            let tl = src[y0 * sw + x0] as f32;
            let tr = src[y0 * sw + x1] as f32;
            let bl = src[y1 * sw + x0] as f32;
            let br = src[y1 * sw + x1] as f32;

            let top = tl + (tr - tl) * wx;
            let bot = bl + (br - bl) * wx;
            out[y * dw + x] = (top + (bot - top) * wy).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Decode one stride level's anchors into frame-space detections.
fn decode_level(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    out: &mut Vec<(BoundingBox, Landmarks)>,
) {
    let grid_w = INPUT_SIZE / stride;
    let grid_h = INPUT_SIZE / stride;
    let anchors = grid_w * grid_h * ANCHORS_PER_CELL;

    for idx in 0..anchors {
        let score = match scores.get(idx) {
            Some(&s) if s > CONFIDENCE_THRESHOLD => s,
            _ => continue,
        };

        let cell = idx / ANCHORS_PER_CELL;
        let anchor_x = ((cell % grid_w) * stride) as f32;
        let anchor_y = ((cell / grid_w) * stride) as f32;

        let b = idx * 4;
        if b + 3 >= boxes.len() {
            continue;
        }
        let (x1, y1) = letterbox.to_frame(
            anchor_x - boxes[b] * stride as f32,
            anchor_y - boxes[b + 1] * stride as f32,
        );
        let (x2, y2) = letterbox.to_frame(
            anchor_x + boxes[b + 2] * stride as f32,
            anchor_y + boxes[b + 3] * stride as f32,
        );

        // Landmarks are mandatory here: alignment and pose gating need them.
        let k = idx * 10;
        if k + 9 >= kps.len() {
            continue;
        }
        let mut points = [(0.0f32, 0.0f32); 5];
        for (i, point) in points.iter_mut().enumerate() {
            *point = letterbox.to_frame(
                anchor_x + kps[k + i * 2] * stride as f32,
                anchor_y + kps[k + i * 2 + 1] * stride as f32,
            );
        }

        out.push((
            BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            },
            Landmarks(points),
        ));
    }
}

/// Greedy non-maximum suppression on confidence order.
fn nms(
    mut detections: Vec<(BoundingBox, Landmarks)>,
    iou_threshold: f32,
) -> Vec<(BoundingBox, Landmarks)> {
    detections.sort_by(|a, b| {
        b.0.confidence
            .partial_cmp(&a.0.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<(BoundingBox, Landmarks)> = Vec::new();
    for det in detections {
        if kept.iter().all(|k| iou(&k.0, &det.0) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
