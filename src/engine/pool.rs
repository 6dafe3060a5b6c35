//! Model pool
//!
//! Lazy loading and automatic unloading of the detector and embedder models
//! after an idle timeout, so a mostly-idle service keeps a small footprint.

use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use openvino::{CompiledModel, Core};
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::{InferenceConfig, ModelsConfig};

/// Wrapper for OpenVINO Core that implements Send + Sync
pub struct SafeCore(Core);
unsafe impl Send for SafeCore {}
unsafe impl Sync for SafeCore {}

impl Deref for SafeCore {
    type Target = Core;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for SafeCore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Wrapper for OpenVINO CompiledModel that implements Send + Sync
#[derive(Clone)]
pub struct SafeCompiledModel(pub Arc<CompiledModel>);
unsafe impl Send for SafeCompiledModel {}
unsafe impl Sync for SafeCompiledModel {}

impl SafeCompiledModel {
    /// Create an inference request
    /// OpenVINO CompiledModel methods are thread-safe in C++, but the Rust
    /// bindings require &mut self. We bypass this restriction safely.
    pub fn create_infer_request(&self) -> anyhow::Result<openvino::InferRequest> {
        unsafe {
            let ptr = Arc::as_ptr(&self.0) as *mut CompiledModel;
            (*ptr).create_infer_request().map_err(|e| e.into())
        }
    }
}

/// A cached model with its last access time
struct CachedModel {
    compiled: SafeCompiledModel,
    last_access: Instant,
}

/// Models the pool knows how to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Detector,
    Embedder,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Detector => "detector",
            ModelType::Embedder => "embedder",
        }
    }
}

/// Model pool with lazy loading and idle auto-unloading
pub struct ModelPool {
    core: Arc<RwLock<SafeCore>>,
    device: String,
    idle_timeout: Duration,

    detector_path: PathBuf,
    embedder_path: PathBuf,

    detector: RwLock<Option<CachedModel>>,
    embedder: RwLock<Option<CachedModel>>,

    shutdown: Notify,
}

impl ModelPool {
    pub fn new(config: &InferenceConfig, models: &ModelsConfig) -> anyhow::Result<Self> {
        let core = Core::new()?;

        Ok(Self {
            core: Arc::new(RwLock::new(SafeCore(core))),
            device: config.device.clone(),
            idle_timeout: Duration::from_secs(config.model_idle_timeout),
            detector_path: models.detector.clone(),
            embedder_path: models.embedder.clone(),
            detector: RwLock::new(None),
            embedder: RwLock::new(None),
            shutdown: Notify::new(),
        })
    }

    fn slot(&self, model_type: ModelType) -> (&RwLock<Option<CachedModel>>, &PathBuf) {
        match model_type {
            ModelType::Detector => (&self.detector, &self.detector_path),
            ModelType::Embedder => (&self.embedder, &self.embedder_path),
        }
    }

    /// Get or load a model, returning a clone of the compiled model
    pub fn get_model(&self, model_type: ModelType) -> anyhow::Result<SafeCompiledModel> {
        let (cache, path) = self.slot(model_type);

        {
            let read_guard = cache.read();
            if read_guard.is_some() {
                drop(read_guard);
                let mut write_guard = cache.write();
                if let Some(ref mut cached) = *write_guard {
                    cached.last_access = Instant::now();
                    return Ok(cached.compiled.clone());
                }
            }
        }

        let mut write_guard = cache.write();

        // Double-check after acquiring the write lock
        if let Some(ref mut cached) = *write_guard {
            cached.last_access = Instant::now();
            return Ok(cached.compiled.clone());
        }

        info!("Loading model: {} from {}", model_type.as_str(), path.display());
        let start = Instant::now();

        // Core methods like read_model require &mut self in the Rust bindings
        let mut core = self.core.write();
        let model = core.read_model_from_file(&path.to_string_lossy(), "")?;
        let compiled = core.compile_model(&model, self.device.as_str().into())?;
        let safe_compiled = SafeCompiledModel(Arc::new(compiled));

        info!(
            "Model {} loaded in {:?}",
            model_type.as_str(),
            start.elapsed()
        );

        *write_guard = Some(CachedModel {
            compiled: safe_compiled.clone(),
            last_access: Instant::now(),
        });

        Ok(safe_compiled)
    }

    pub fn is_loaded(&self, model_type: ModelType) -> bool {
        self.slot(model_type).0.read().is_some()
    }

    /// Get status of all models
    pub fn get_status(&self) -> Vec<(ModelType, bool)> {
        vec![
            (ModelType::Detector, self.is_loaded(ModelType::Detector)),
            (ModelType::Embedder, self.is_loaded(ModelType::Embedder)),
        ]
    }

    fn unload_model(&self, model_type: ModelType) {
        let mut write_guard = self.slot(model_type).0.write();
        if write_guard.is_some() {
            info!("Unloading idle model: {}", model_type.as_str());
            *write_guard = None;
        }
    }

    fn cleanup_idle_models(&self) {
        let now = Instant::now();
        for model_type in [ModelType::Detector, ModelType::Embedder] {
            let should_unload = {
                let read_guard = self.slot(model_type).0.read();
                match *read_guard {
                    Some(ref cached) => now.duration_since(cached.last_access) > self.idle_timeout,
                    None => false,
                }
            };

            if should_unload {
                self.unload_model(model_type);
            }
        }
    }

    /// Run the background cleanup loop until shutdown is signalled
    pub async fn start_cleanup_task(self: Arc<Self>) {
        let check_interval = Duration::from_secs(60);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(check_interval) => {
                    debug!("Running model cleanup check");
                    self.cleanup_idle_models();
                }
                _ = self.shutdown.notified() => {
                    info!("Model pool cleanup task shutting down");
                    break;
                }
            }
        }
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Drop for ModelPool {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}
