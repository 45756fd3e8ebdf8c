//! In-process detectors and loaders for exercising the pipeline without
//! model weights.

use crate::{
    catalog::ModelCatalog,
    codec::{CodecConfig, ImageCodec, OutputFormat, RasterImage},
    detection::Detection,
    errors::{InferError, ModelLoadError},
    model::{DetectionModel, LoadedModel, ModelInfo, ModelLoader},
};
use image::{Rgb, RgbImage};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

/// Returns the same detections for every image.
#[derive(Debug, Default)]
pub struct FixedModel {
    detections: Vec<Detection>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FixedModel {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Sleeps for `delay` inside every `infer` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DetectionModel for FixedModel {
    fn infer(&self, _image: &RasterImage) -> Result<Vec<Detection>, InferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        Ok(self.detections.clone())
    }
}

#[derive(Debug)]
pub struct FailingModel {
    message: String,
}

impl FailingModel {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl DetectionModel for FailingModel {
    fn infer(&self, _image: &RasterImage) -> Result<Vec<Detection>, InferError> {
        Err(InferError::new(self.message.clone()))
    }
}

enum Entry {
    Model(Arc<dyn DetectionModel>),
    Malformed(String),
}

/// Loader over a fixed name → model table. Names are canonicalised like the
/// on-disk catalog, so `yolov8n.pt` finds `yolov8n`.
#[derive(Default)]
pub struct StaticLoader {
    entries: HashMap<String, Entry>,
    load_delay: Option<Duration>,
    loads_started: AtomicUsize,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(self, name: &str, model: impl DetectionModel + 'static) -> Self {
        self.with_shared_model(name, Arc::new(model))
    }

    pub fn with_shared_model(mut self, name: &str, model: Arc<dyn DetectionModel>) -> Self {
        self.entries.insert(name.to_string(), Entry::Model(model));
        self
    }

    /// Registers a name whose weights fail to parse.
    pub fn with_malformed(mut self, name: &str, reason: &str) -> Self {
        self.entries
            .insert(name.to_string(), Entry::Malformed(reason.to_string()));
        self
    }

    /// Every `load` sleeps for `delay` before returning.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Number of `load` calls that have begun, including ones still sleeping.
    pub fn loads_started(&self) -> usize {
        self.loads_started.load(Ordering::SeqCst)
    }

    fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl ModelLoader for StaticLoader {
    fn load(&self, name: &str) -> Result<LoadedModel, ModelLoadError> {
        self.loads_started.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            thread::sleep(delay);
        }

        let name = ModelCatalog::canonical(name);
        match self.entries.get(name) {
            Some(Entry::Model(model)) => Ok(LoadedModel::new(name, Arc::clone(model))),
            Some(Entry::Malformed(reason)) => Err(ModelLoadError::Malformed {
                name: name.to_string(),
                reason: reason.clone(),
            }),
            None => Err(ModelLoadError::UnknownModel {
                name: name.to_string(),
                available: self.names().join(", "),
            }),
        }
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        self.names()
            .into_iter()
            .map(|name| ModelInfo {
                name: name.to_string(),
                description: "in-memory test model".to_string(),
                file_name: String::new(),
                file_path: String::new(),
                is_available: matches!(self.entries.get(name), Some(Entry::Model(_))),
            })
            .collect()
    }
}

/// Uniform-colour raster.
pub fn solid_image(width: u32, height: u32, color: [u8; 3]) -> RasterImage {
    RasterImage::new(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// Encodes a uniform-colour image in the given container.
pub fn encoded_image(width: u32, height: u32, format: OutputFormat) -> Vec<u8> {
    let codec = ImageCodec::new(CodecConfig {
        output_format: format,
        ..CodecConfig::default()
    });
    match codec.encode(&solid_image(width, height, [90, 120, 150])) {
        Ok(encoded) => encoded.bytes,
        Err(e) => panic!("encoding test image failed: {}", e),
    }
}
