use crate::{
    codec::RasterImage,
    detection::Detection,
    errors::{InferError, ModelLoadError, NoModelLoaded},
    model::{DetectionModel, ModelInfo, ModelLoader},
};
use std::{
    fmt,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

/// Immutable, fully constructed model plus the metadata it was loaded with.
pub struct ModelHandle {
    pub name: String,
    /// Increases by one with every successful load on a registry.
    pub generation: u64,
    pub loaded_at: SystemTime,
    model: Arc<dyn DetectionModel>,
}

impl ModelHandle {
    pub fn infer(&self, image: &RasterImage) -> Result<Vec<Detection>, InferError> {
        self.model.infer(image)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

/// Owns the active model slot.
///
/// Loading happens outside the lock; the lock only guards the pointer read
/// in [`current`](Self::current) and the assignment in [`swap`](Self::swap).
/// Handles that were superseded stay alive for as long as a request holds
/// them.
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    slot: RwLock<Option<Arc<ModelHandle>>>,
    generations: AtomicU64,
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slot: RwLock::new(None),
            generations: AtomicU64::new(0),
        }
    }

    /// Builds a handle without touching the active slot.
    #[tracing::instrument(skip(self))]
    pub fn load(&self, name: &str) -> Result<Arc<ModelHandle>, ModelLoadError> {
        let loaded = self.loader.load(name)?;
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::debug!(model = %loaded.name, generation, "Model built");

        Ok(Arc::new(ModelHandle {
            name: loaded.name,
            generation,
            loaded_at: SystemTime::now(),
            model: loaded.model,
        }))
    }

    /// Replaces the active handle, returning the one it superseded.
    pub fn swap(&self, handle: Arc<ModelHandle>) -> Option<Arc<ModelHandle>> {
        let previous = {
            let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
            slot.replace(handle)
        };

        if let Some(prev) = &previous {
            tracing::debug!(
                model = %prev.name,
                generation = prev.generation,
                "Superseded model handle"
            );
        }
        previous
    }

    /// Snapshot of the active handle.
    pub fn current(&self) -> Result<Arc<ModelHandle>, NoModelLoaded> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(NoModelLoaded)
    }

    pub fn load_and_swap(&self, name: &str) -> Result<Arc<ModelHandle>, ModelLoadError> {
        let handle = self.load(name)?;
        self.swap(Arc::clone(&handle));
        Ok(handle)
    }

    pub fn available_models(&self) -> Vec<ModelInfo> {
        self.loader.available_models()
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("current", &self.current().ok())
            .finish_non_exhaustive()
    }
}
