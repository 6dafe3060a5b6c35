//! Inference engine module
//!
//! OpenVINO-backed face detection and embedding with lazy model loading
//! and idle auto-unloading.

pub mod detector;
pub mod embedder;
pub mod encoder;
pub mod pool;
pub mod preprocess;

pub use detector::FaceDetector;
pub use embedder::{FaceEmbedder, FaceEmbedding};
pub use encoder::{FaceEncoder, OpenVinoEncoder};
pub use pool::ModelPool;
