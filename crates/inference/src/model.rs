use crate::{
    codec::RasterImage,
    detection::Detection,
    errors::{InferError, ModelLoadError},
};
use serde::Serialize;
use std::{fmt, sync::Arc};

/// A loaded detector. Implementations must be safe to call from several
/// requests at once.
pub trait DetectionModel: Send + Sync {
    /// Boxes are in source-image pixel coordinates.
    fn infer(&self, image: &RasterImage) -> Result<Vec<Detection>, InferError>;
}

/// Turns a model name into a ready [`DetectionModel`].
pub trait ModelLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<LoadedModel, ModelLoadError>;

    fn available_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }
}

#[derive(Clone)]
pub struct LoadedModel {
    /// Canonical name, e.g. `yolov8n` for a `yolov8n.pt` request.
    pub name: String,
    pub model: Arc<dyn DetectionModel>,
}

impl LoadedModel {
    pub fn new(name: impl Into<String>, model: Arc<dyn DetectionModel>) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub description: String,
    pub file_name: String,
    pub file_path: String,
    pub is_available: bool,
}
