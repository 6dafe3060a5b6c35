//! Image decoding and tensor preparation for the inference models

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;

use super::detector::FaceBox;

/// Detector input resolution (SCRFD)
pub const DETECTOR_INPUT_SIZE: (u32, u32) = (640, 640);
/// Embedder input resolution (ArcFace)
pub const EMBEDDER_INPUT_SIZE: (u32, u32) = (112, 112);

/// Decode an uploaded photo (JPEG, PNG, WebP, ...)
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(data).context("unsupported or corrupt image data")
}

/// Scale mapping between the original image and the detector input canvas
#[derive(Debug, Clone, Copy)]
pub struct ResizeInfo {
    pub scale: f32,
}

impl ResizeInfo {
    pub fn new(orig: (u32, u32), target: (u32, u32)) -> Self {
        let scale_w = target.0 as f32 / orig.0 as f32;
        let scale_h = target.1 as f32 / orig.1 as f32;
        Self {
            scale: scale_w.min(scale_h),
        }
    }

    /// Map a coordinate from detector input space back to the original image
    pub fn to_original(&self, v: f32) -> f32 {
        v / self.scale
    }
}

/// Resize the image onto the detector canvas (top-left anchored, zero padded)
/// and convert to an NCHW BGR tensor.
pub fn prepare_detector_input(image: &DynamicImage) -> (Array4<f32>, ResizeInfo) {
    let (orig_w, orig_h) = image.dimensions();
    let info = ResizeInfo::new((orig_w, orig_h), DETECTOR_INPUT_SIZE);

    let new_w = ((orig_w as f32 * info.scale) as u32).max(1);
    let new_h = ((orig_h as f32 * info.scale) as u32).max(1);
    let resized = image.resize_exact(new_w, new_h, FilterType::Triangle);

    let (target_w, target_h) = DETECTOR_INPUT_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, target_h as usize, target_w as usize));
    fill_bgr(&mut tensor, &resized.to_rgb8());

    (tensor, info)
}

/// Resize to an exact model input size and convert to an NCHW BGR tensor
pub fn image_to_tensor(image: &DynamicImage, size: (u32, u32)) -> Array4<f32> {
    let resized = image.resize_exact(size.0, size.1, FilterType::Lanczos3);
    let mut tensor = Array4::<f32>::zeros((1, 3, size.1 as usize, size.0 as usize));
    fill_bgr(&mut tensor, &resized.to_rgb8());
    tensor
}

/// InsightFace models expect BGR channel order, normalized (pixel - 127.5) / 128
fn fill_bgr(tensor: &mut Array4<f32>, rgb: &image::RgbImage) {
    for (x, y, pixel) in rgb.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = (pixel[2] as f32 - 127.5) / 128.0;
        tensor[[0, 1, y as usize, x as usize]] = (pixel[1] as f32 - 127.5) / 128.0;
        tensor[[0, 2, y as usize, x as usize]] = (pixel[0] as f32 - 127.5) / 128.0;
    }
}

/// Crop the detected face region with a small margin around the box
pub fn crop_face(image: &DynamicImage, face: &FaceBox) -> DynamicImage {
    let (img_w, img_h) = image.dimensions();

    let box_w = face.x2 - face.x1;
    let box_h = face.y2 - face.y1;
    let margin_x = box_w * 0.1;
    let margin_y = box_h * 0.1;

    let x1 = (face.x1 - margin_x).max(0.0) as u32;
    let y1 = (face.y1 - margin_y).max(0.0) as u32;
    let x2 = ((face.x2 + margin_x) as u32).min(img_w);
    let y2 = ((face.y2 + margin_y) as u32).min(img_h);

    let w = x2.saturating_sub(x1).max(1);
    let h = y2.saturating_sub(y1).max(1);

    image.crop_imm(x1, y1, w, h)
}
