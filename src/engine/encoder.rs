//! Face encoding entry point used by the service layer

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use super::detector::FaceDetector;
use super::embedder::{FaceEmbedder, FaceEmbedding};
use super::pool::ModelPool;
use super::preprocess::{crop_face, decode_image};

/// Detection confidence floor for enrollment and identification photos
const DETECT_CONFIDENCE: f32 = 0.5;

/// Produces a face encoding from raw photo bytes.
///
/// `Ok(None)` means the photo decoded fine but no face was found in it.
/// Implementations block; callers run them on a blocking thread.
pub trait FaceEncoder: Send + Sync + 'static {
    fn encode(&self, image_data: &[u8]) -> Result<Option<FaceEmbedding>>;

    /// Per-model readiness, surfaced by the health endpoint
    fn model_status(&self) -> HashMap<String, bool>;
}

/// OpenVINO-backed encoder: detect the most confident face, crop and embed it
pub struct OpenVinoEncoder {
    pool: Arc<ModelPool>,
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl OpenVinoEncoder {
    pub fn new(pool: Arc<ModelPool>, embedding_dim: usize) -> Self {
        let detector = FaceDetector::new(pool.clone(), DETECT_CONFIDENCE);
        let embedder = FaceEmbedder::new(pool.clone(), embedding_dim);

        Self {
            pool,
            detector,
            embedder,
        }
    }
}

impl FaceEncoder for OpenVinoEncoder {
    fn encode(&self, image_data: &[u8]) -> Result<Option<FaceEmbedding>> {
        let image = decode_image(image_data)?;

        let faces = self.detector.detect(&image)?;
        let Some(face) = faces.first() else {
            return Ok(None);
        };

        let crop = crop_face(&image, face);
        let embedding = self.embedder.embed(&crop)?;

        Ok(Some(embedding))
    }

    fn model_status(&self) -> HashMap<String, bool> {
        self.pool
            .get_status()
            .into_iter()
            .map(|(t, loaded)| (t.as_str().to_string(), loaded))
            .collect()
    }
}
