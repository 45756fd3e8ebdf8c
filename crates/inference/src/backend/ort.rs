use super::DetectorConfig;
use crate::{
    catalog::ModelCatalog,
    codec::RasterImage,
    detection::Detection,
    errors::{InferError, ModelLoadError},
    labels::COCO_LABELS,
    model::{DetectionModel, LoadedModel, ModelInfo, ModelLoader},
    postprocessing::{PostProcessor, TransformParams},
};
use anyhow::Context;
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use preprocess::{CpuPreProcessor, Preprocess};
use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";

/// Builds [`OrtDetector`]s from `<models_dir>/<name>.onnx`.
#[derive(Debug, Clone)]
pub struct OrtLoader {
    catalog: ModelCatalog,
    config: DetectorConfig,
}

impl OrtLoader {
    pub fn new(catalog: ModelCatalog, config: DetectorConfig) -> Self {
        Self { catalog, config }
    }
}

impl ModelLoader for OrtLoader {
    fn load(&self, name: &str) -> Result<LoadedModel, ModelLoadError> {
        let (canonical, path) = self.catalog.resolve(name)?;

        let detector =
            OrtDetector::from_file(&path, &self.config).map_err(|e| ModelLoadError::Malformed {
                name: canonical.clone(),
                reason: format!("{:#}", e),
            })?;

        Ok(LoadedModel::new(canonical, Arc::new(detector)))
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        self.catalog.list()
    }
}

struct SessionState {
    session: Session,
    preprocessor: CpuPreProcessor,
}

/// YOLOv8 ONNX export run through ONNX Runtime on the CPU.
///
/// The session and the resize scratch buffers need `&mut`, so concurrent
/// calls on one detector are serialised.
pub struct OrtDetector {
    state: Mutex<SessionState>,
    postprocessor: PostProcessor,
}

impl OrtDetector {
    pub fn from_file(path: &Path, config: &DetectorConfig) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(path)
            .with_context(|| format!("building session from {}", path.display()))?;

        tracing::info!(path = %path.display(), "ONNX model loaded");

        Ok(Self {
            state: Mutex::new(SessionState {
                session,
                preprocessor: CpuPreProcessor::new(config.input_size),
            }),
            postprocessor: PostProcessor::new(config.confidence_threshold, config.iou_threshold),
        })
    }

    fn run(&self, image: &RasterImage) -> anyhow::Result<Vec<Detection>> {
        let (width, height) = image.dimensions();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let SessionState {
            session,
            preprocessor,
        } = &mut *state;

        let input = {
            let _s = common::span_debug!("letterbox");
            preprocessor.preprocess(image.as_raw(), width, height)?
        };

        let outputs = session.run(ort::inputs![
            INPUT_NAME => TensorRef::from_array_view(input.data.view())?
        ])?;
        let raw = outputs[OUTPUT_NAME]
            .try_extract_array::<f32>()
            .context("extracting detection head output")?;

        let transform = TransformParams {
            orig_width: width,
            orig_height: height,
            scale: input.scale,
            offset_x: input.offset_x,
            offset_y: input.offset_y,
        };

        self.postprocessor
            .parse_detections(&raw.view(), &transform, &COCO_LABELS)
    }
}

impl DetectionModel for OrtDetector {
    fn infer(&self, image: &RasterImage) -> Result<Vec<Detection>, InferError> {
        self.run(image).map_err(InferError::from)
    }
}
