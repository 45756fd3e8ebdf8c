use crate::{errors::ModelLoadError, model::ModelInfo};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "yolov8n";
pub const MODEL_EXTENSION: &str = "onnx";

/// Known model names and their descriptions.
pub const SUPPORTED_MODELS: [(&str, &str); 5] = [
    ("yolov8n", "YOLOv8 Nano - smallest and fastest model"),
    ("yolov8s", "YOLOv8 Small - balanced model"),
    ("yolov8m", "YOLOv8 Medium - larger, more accurate model"),
    ("yolov8l", "YOLOv8 Large - high accuracy model"),
    ("yolov8x", "YOLOv8 XLarge - highest accuracy model"),
];

/// Resolves model names to weight files under a models directory.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models_dir: PathBuf,
}

impl ModelCatalog {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Strips a trailing `.pt` / `.onnx` and surrounding whitespace.
    pub fn canonical(name: &str) -> &str {
        let name = name.trim();
        name.strip_suffix(".pt")
            .or_else(|| name.strip_suffix(".onnx"))
            .unwrap_or(name)
    }

    pub fn description(name: &str) -> Option<&'static str> {
        let name = Self::canonical(name);
        SUPPORTED_MODELS
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, description)| *description)
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.models_dir
            .join(format!("{}.{}", Self::canonical(name), MODEL_EXTENSION))
    }

    /// Returns the canonical name and the weight file path.
    pub fn resolve(&self, name: &str) -> Result<(String, PathBuf), ModelLoadError> {
        let canonical = Self::canonical(name);
        if Self::description(canonical).is_none() {
            return Err(ModelLoadError::UnknownModel {
                name: name.to_string(),
                available: SUPPORTED_MODELS
                    .iter()
                    .map(|(n, _)| *n)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let path = self.path_for(canonical);
        if !path.is_file() {
            return Err(ModelLoadError::NotFound {
                name: canonical.to_string(),
                path,
            });
        }

        Ok((canonical.to_string(), path))
    }

    pub fn list(&self) -> Vec<ModelInfo> {
        SUPPORTED_MODELS
            .iter()
            .map(|(name, description)| {
                let path = self.path_for(name);
                ModelInfo {
                    name: name.to_string(),
                    description: description.to_string(),
                    file_name: format!("{}.{}", name, MODEL_EXTENSION),
                    is_available: path.is_file(),
                    file_path: path.display().to_string(),
                }
            })
            .collect()
    }
}
