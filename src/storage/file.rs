//! Flat-file encoding store
//!
//! The whole mapping is held in memory and rewritten to disk on every
//! insertion. Writes go to a temp file in the target directory followed by a
//! rename, so a crash mid-write leaves the previous file intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::traits::{cosine_similarity, EncodingRecord, EncodingStore};

pub struct FileStore {
    path: PathBuf,
    encodings: RwLock<HashMap<String, Vec<f32>>>,
}

impl FileStore {
    /// Open the store, loading the encodings file if one exists.
    /// A malformed file is an error; startup should not continue on top of it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let encodings = if path.exists() {
            let data =
                std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let records: Vec<EncodingRecord> = postcard::from_bytes(&data)
                .with_context(|| format!("decoding {}", path.display()))?;
            info!(
                "Loaded {} enrolled encodings from {}",
                records.len(),
                path.display()
            );
            records
                .into_iter()
                .map(|r| (r.student_id, r.encoding))
                .collect()
        } else {
            info!("No encodings file at {}, starting empty", path.display());
            HashMap::new()
        };

        Ok(Self {
            path,
            encodings: RwLock::new(encodings),
        })
    }

    /// Serialize the full mapping and atomically replace the store file
    fn persist(&self, encodings: &HashMap<String, Vec<f32>>) -> Result<()> {
        let records: Vec<EncodingRecord> = encodings
            .iter()
            .map(|(id, encoding)| EncodingRecord {
                student_id: id.clone(),
                encoding: encoding.clone(),
            })
            .collect();
        let data = postcard::to_allocvec(&records)?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        std::fs::write(tmp.path(), &data)?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;

        Ok(())
    }
}

#[async_trait]
impl EncodingStore for FileStore {
    async fn put(&self, student_id: &str, encoding: &[f32]) -> Result<()> {
        let mut guard = self.encodings.write();

        // Persist first; the in-memory map only changes once the file is safe
        let mut next = guard.clone();
        next.insert(student_id.to_string(), encoding.to_vec());
        self.persist(&next)?;
        *guard = next;

        debug!("Stored encoding for {}", student_id);
        Ok(())
    }

    async fn find_match(&self, encoding: &[f32], threshold: f32) -> Result<Option<String>> {
        let guard = self.encodings.read();

        for (student_id, stored) in guard.iter() {
            if cosine_similarity(encoding, stored) >= threshold {
                return Ok(Some(student_id.clone()));
            }
        }

        Ok(None)
    }

    async fn get(&self, student_id: &str) -> Result<Option<Vec<f32>>> {
        Ok(self.encodings.read().get(student_id).cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.encodings.read().len())
    }
}
