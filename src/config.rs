//! Service configuration

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub models: ModelsConfig,
    pub recognition: RecognitionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    pub device: String,
    pub model_idle_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub detector: PathBuf,
    pub embedder: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    pub match_threshold: f32,
    pub embedding_dim: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 5000,
                max_upload_mb: 10,
            },
            inference: InferenceConfig {
                device: "CPU".to_string(),
                model_idle_timeout: 300,
            },
            models: ModelsConfig {
                detector: PathBuf::from("models/scrfd_2.5g_kps.onnx"),
                embedder: PathBuf::from("models/w600k_r50.onnx"),
            },
            recognition: RecognitionConfig {
                match_threshold: 0.5,
                embedding_dim: 512,
            },
            storage: StorageConfig {
                path: PathBuf::from("data/encodings.bin"),
            },
        }
    }
}
