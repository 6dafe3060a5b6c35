//! Face service - core business logic
//!
//! Orchestrates encoding and store operations for the HTTP handlers.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::engine::FaceEncoder;
use crate::storage::EncodingStore;

use super::types::*;

pub struct FaceService<S: EncodingStore, E: FaceEncoder> {
    encoder: Arc<E>,
    storage: Arc<S>,
    config: Config,
}

impl<S: EncodingStore, E: FaceEncoder> FaceService<S, E> {
    pub fn new(encoder: Arc<E>, storage: Arc<S>, config: Config) -> Self {
        Self {
            encoder,
            storage,
            config,
        }
    }

    /// Get a reference to the storage
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Register a face encoding under `student_id`.
    /// A photo without a detectable face yields an unsuccessful result and
    /// leaves the store untouched.
    pub async fn register(&self, image_data: &[u8], student_id: &str) -> Result<RegisterResult> {
        let Some(embedding) = self.encode(image_data).await? else {
            return Ok(RegisterResult {
                success: false,
                student_id: student_id.to_string(),
                message: "No face found in the photo".to_string(),
            });
        };

        self.storage.put(student_id, &embedding.vector).await?;
        info!("Registered encoding for {}", student_id);

        Ok(RegisterResult {
            success: true,
            student_id: student_id.to_string(),
            message: "Face registered".to_string(),
        })
    }

    /// Identify the face in a photo against all stored encodings.
    /// No stored match is a successful "no match" result, not an error.
    pub async fn identify(&self, image_data: &[u8]) -> Result<IdentifyResult> {
        let Some(embedding) = self.encode(image_data).await? else {
            return Ok(IdentifyResult {
                face_found: false,
                student_id: None,
            });
        };

        let student_id = self
            .storage
            .find_match(&embedding.vector, self.config.recognition.match_threshold)
            .await?;

        Ok(IdentifyResult {
            face_found: true,
            student_id,
        })
    }

    /// Get health status
    pub fn health(&self) -> HealthResult {
        HealthResult {
            healthy: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
            models_loaded: self.encoder.model_status(),
        }
    }

    /// Run the blocking encoder off the async runtime
    async fn encode(&self, image_data: &[u8]) -> Result<Option<crate::engine::FaceEmbedding>> {
        let encoder = self.encoder.clone();
        let data = image_data.to_vec();
        tokio::task::spawn_blocking(move || encoder.encode(&data)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FaceEmbedding;
    use std::collections::HashMap;
    use tempfile::tempdir;

    use crate::storage::FileStore;

    /// Encoder double keyed on the raw photo bytes
    struct StubEncoder {
        vectors: HashMap<Vec<u8>, Vec<f32>>,
    }

    impl StubEncoder {
        fn new(photos: &[(&[u8], Vec<f32>)]) -> Self {
            Self {
                vectors: photos
                    .iter()
                    .map(|(bytes, v)| (bytes.to_vec(), v.clone()))
                    .collect(),
            }
        }
    }

    impl FaceEncoder for StubEncoder {
        fn encode(&self, image_data: &[u8]) -> Result<Option<FaceEmbedding>> {
            Ok(self
                .vectors
                .get(image_data)
                .map(|v| FaceEmbedding::new(v.clone())))
        }

        fn model_status(&self) -> HashMap<String, bool> {
            HashMap::new()
        }
    }

    fn service_with(
        dir: &std::path::Path,
        photos: &[(&[u8], Vec<f32>)],
    ) -> FaceService<FileStore, StubEncoder> {
        let storage = Arc::new(FileStore::open(dir.join("encodings.bin")).unwrap());
        let encoder = Arc::new(StubEncoder::new(photos));
        FaceService::new(encoder, storage, Config::default())
    }

    #[tokio::test]
    async fn register_then_identify_same_photo() {
        let dir = tempdir().unwrap();
        let service = service_with(dir.path(), &[(b"alice-photo", vec![1.0, 0.0, 0.0])]);

        let registered = service.register(b"alice-photo", "s-1001").await.unwrap();
        assert!(registered.success);

        let identified = service.identify(b"alice-photo").await.unwrap();
        assert!(identified.face_found);
        assert_eq!(identified.student_id.as_deref(), Some("s-1001"));
    }

    #[tokio::test]
    async fn register_without_face_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let service = service_with(dir.path(), &[]);

        let registered = service.register(b"landscape-photo", "s-1001").await.unwrap();
        assert!(!registered.success);
        assert_eq!(service.storage().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn identify_with_empty_store_is_no_match() {
        let dir = tempdir().unwrap();
        let service = service_with(dir.path(), &[(b"bob-photo", vec![0.0, 1.0, 0.0])]);

        let identified = service.identify(b"bob-photo").await.unwrap();
        assert!(identified.face_found);
        assert!(identified.student_id.is_none());
    }

    #[tokio::test]
    async fn distinct_photos_do_not_cross_match() {
        let dir = tempdir().unwrap();
        let service = service_with(
            dir.path(),
            &[
                (b"alice-photo", vec![1.0, 0.0, 0.0]),
                (b"bob-photo", vec![0.0, 1.0, 0.0]),
            ],
        );

        service.register(b"alice-photo", "s-1001").await.unwrap();
        service.register(b"bob-photo", "s-1002").await.unwrap();

        let identified = service.identify(b"bob-photo").await.unwrap();
        assert_eq!(identified.student_id.as_deref(), Some("s-1002"));
    }

    #[tokio::test]
    async fn identify_without_face_reports_it() {
        let dir = tempdir().unwrap();
        let service = service_with(dir.path(), &[]);

        let identified = service.identify(b"landscape-photo").await.unwrap();
        assert!(!identified.face_found);
        assert!(identified.student_id.is_none());
    }
}
