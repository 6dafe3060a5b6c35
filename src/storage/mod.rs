//! Storage module for enrolled face encodings

pub mod file;
pub mod traits;

pub use file::FileStore;
pub use traits::{EncodingRecord, EncodingStore};
