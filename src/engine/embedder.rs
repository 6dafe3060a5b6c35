//! ArcFace face embedder
//!
//! Turns an aligned face crop into a 512-dimensional feature vector.

use std::sync::Arc;

use anyhow::{Context, Result};
use image::DynamicImage;
use openvino::{ElementType, Shape, Tensor};

use super::pool::{ModelPool, ModelType};
use super::preprocess::{image_to_tensor, EMBEDDER_INPUT_SIZE};

/// An L2-normalized face encoding
#[derive(Debug, Clone)]
pub struct FaceEmbedding {
    pub vector: Vec<f32>,
}

impl FaceEmbedding {
    /// Create a new normalized embedding
    pub fn new(mut vector: Vec<f32>) -> Self {
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        Self { vector }
    }

    /// Cosine similarity with another embedding.
    /// Both vectors are normalized, so the dot product is the similarity.
    pub fn cosine_similarity(&self, other: &FaceEmbedding) -> f32 {
        self.vector
            .iter()
            .zip(other.vector.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Serialize to little-endian bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize from little-endian bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            anyhow::bail!("invalid embedding byte length: {}", bytes.len());
        }

        let vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().expect("chunks_exact yields 4 bytes");
                f32::from_le_bytes(arr)
            })
            .collect();

        Ok(Self::new(vector))
    }
}

pub struct FaceEmbedder {
    pool: Arc<ModelPool>,
    embedding_dim: usize,
}

impl FaceEmbedder {
    pub fn new(pool: Arc<ModelPool>, embedding_dim: usize) -> Self {
        Self {
            pool,
            embedding_dim,
        }
    }

    /// Extract an embedding from a face crop
    pub fn embed(&self, face: &DynamicImage) -> Result<FaceEmbedding> {
        let (target_w, target_h) = EMBEDDER_INPUT_SIZE;
        let input_tensor = image_to_tensor(face, EMBEDDER_INPUT_SIZE);

        let model = self.pool.get_model(ModelType::Embedder)?;
        let mut request = model.create_infer_request()?;

        let input_shape = Shape::new(&[1, 3, target_h as i64, target_w as i64])?;
        let mut input = Tensor::new(ElementType::F32, &input_shape)?;

        let input_data = input_tensor
            .as_slice()
            .context("embedder input tensor is not contiguous")?;
        unsafe {
            let tensor_data = input.get_raw_data_mut()?.as_mut_ptr() as *mut f32;
            std::ptr::copy_nonoverlapping(input_data.as_ptr(), tensor_data, input_data.len());
        }

        request.set_input_tensor(&input)?;
        request.infer()?;

        let output = request.get_output_tensor()?;
        let output_shape = output.get_shape()?;
        let output_len = output_shape.get_dimensions().iter().product::<i64>() as usize;

        if output_len != self.embedding_dim {
            anyhow::bail!(
                "embedder produced {} values, expected {}",
                output_len,
                self.embedding_dim
            );
        }

        let output_data: Vec<f32> = unsafe {
            let ptr = output.get_raw_data()?.as_ptr() as *const f32;
            std::slice::from_raw_parts(ptr, output_len).to_vec()
        };

        Ok(FaceEmbedding::new(output_data))
    }
}
