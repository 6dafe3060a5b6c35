//! SCRFD face detector
//!
//! Decodes the score and bbox outputs of an InsightFace SCRFD model
//! (strides 8/16/32, two anchors per cell) into face boxes in original
//! image coordinates.

use std::sync::Arc;

use anyhow::{Context, Result};
use image::DynamicImage;
use openvino::{ElementType, Shape, Tensor};

use super::pool::{ModelPool, ModelType};
use super::preprocess::{prepare_detector_input, ResizeInfo, DETECTOR_INPUT_SIZE};

const STRIDES: [u32; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
const NMS_IOU_THRESHOLD: f32 = 0.4;

/// A detected face in original image coordinates
#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

pub struct FaceDetector {
    pool: Arc<ModelPool>,
    confidence_threshold: f32,
}

impl FaceDetector {
    pub fn new(pool: Arc<ModelPool>, confidence_threshold: f32) -> Self {
        Self {
            pool,
            confidence_threshold,
        }
    }

    /// Detect faces, most confident first
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let (input_tensor, resize_info) = prepare_detector_input(image);

        let model = self.pool.get_model(ModelType::Detector)?;
        let mut request = model.create_infer_request()?;

        let (input_w, input_h) = DETECTOR_INPUT_SIZE;
        let input_shape = Shape::new(&[1, 3, input_h as i64, input_w as i64])?;
        let mut input = Tensor::new(ElementType::F32, &input_shape)?;

        let input_data = input_tensor
            .as_slice()
            .context("detector input tensor is not contiguous")?;
        unsafe {
            let tensor_data = input.get_raw_data_mut()?.as_mut_ptr() as *mut f32;
            std::ptr::copy_nonoverlapping(input_data.as_ptr(), tensor_data, input_data.len());
        }

        request.set_input_tensor(&input)?;
        request.infer()?;

        let mut boxes = self.decode_outputs(&request, &resize_info)?;
        boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let boxes = nms(boxes, NMS_IOU_THRESHOLD);

        tracing::debug!("Detected {} faces", boxes.len());
        Ok(boxes)
    }

    /// Decode the per-stride score and bbox outputs.
    ///
    /// SCRFD with keypoints emits nine outputs: scores for each stride,
    /// then bbox distances, then landmark offsets (which we don't read,
    /// the face crop works off the box alone).
    fn decode_outputs(
        &self,
        request: &openvino::InferRequest,
        resize_info: &ResizeInfo,
    ) -> Result<Vec<FaceBox>> {
        let (input_w, _) = DETECTOR_INPUT_SIZE;
        let mut boxes = Vec::new();

        for (idx, &stride) in STRIDES.iter().enumerate() {
            let scores = read_tensor_f32(&request.get_output_tensor_by_index(idx)?)?;
            let bboxes = read_tensor_f32(&request.get_output_tensor_by_index(idx + STRIDES.len())?)?;

            let feat_w = (input_w / stride) as usize;

            for (anchor, &score) in scores.iter().enumerate() {
                if score < self.confidence_threshold {
                    continue;
                }
                if bboxes.len() < (anchor + 1) * 4 {
                    anyhow::bail!("detector bbox output shorter than score output");
                }

                // Anchor centers repeat once per anchor within a cell
                let cell = anchor / ANCHORS_PER_CELL;
                let cx = ((cell % feat_w) as u32 * stride) as f32;
                let cy = ((cell / feat_w) as u32 * stride) as f32;

                // Box regression is distance-to-sides in stride units
                let d = &bboxes[anchor * 4..anchor * 4 + 4];
                let stride = stride as f32;

                boxes.push(FaceBox {
                    x1: resize_info.to_original(cx - d[0] * stride),
                    y1: resize_info.to_original(cy - d[1] * stride),
                    x2: resize_info.to_original(cx + d[2] * stride),
                    y2: resize_info.to_original(cy + d[3] * stride),
                    confidence: score,
                });
            }
        }

        Ok(boxes)
    }
}

fn read_tensor_f32(tensor: &Tensor) -> Result<Vec<f32>> {
    let shape = tensor.get_shape()?;
    let len = shape.get_dimensions().iter().product::<i64>() as usize;
    let data = unsafe {
        let ptr = tensor.get_raw_data()?.as_ptr() as *const f32;
        std::slice::from_raw_parts(ptr, len).to_vec()
    };
    Ok(data)
}

/// Greedy non-maximum suppression; input must be sorted by confidence
fn nms(boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    let mut kept: Vec<FaceBox> = Vec::new();

    for candidate in boxes {
        if kept.iter().all(|k| iou(k, &candidate) < iou_threshold) {
            kept.push(candidate);
        }
    }

    kept
}

fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = face(20.0, 20.0, 30.0, 30.0, 0.8);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_suppresses_overlapping_boxes() {
        let boxes = vec![
            face(0.0, 0.0, 10.0, 10.0, 0.9),
            face(1.0, 1.0, 11.0, 11.0, 0.8),
            face(50.0, 50.0, 60.0, 60.0, 0.7),
        ];
        let kept = nms(boxes, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }
}
