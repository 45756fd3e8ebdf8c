pub mod annotate;
pub mod backend;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod detection;
pub mod errors;
pub mod labels;
pub mod model;
pub mod postprocessing;
pub mod registry;
pub mod service;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types for convenience
pub use annotate::{Annotator, AnnotatorConfig};
pub use backend::DetectorConfig;
#[cfg(feature = "ort-backend")]
pub use backend::ort::{OrtDetector, OrtLoader};
pub use catalog::ModelCatalog;
pub use codec::{CodecConfig, EncodedImage, ImageCodec, OutputFormat, RasterImage};
pub use config::InferenceConfig;
pub use detection::{BoundingBox, Detection};
pub use errors::{
    CodecError, DetectError, ErrorKind, InferError, ModelLoadError, NoModelLoaded,
};
pub use model::{DetectionModel, LoadedModel, ModelInfo, ModelLoader};
pub use registry::{ModelHandle, ModelRegistry};
pub use service::{DetectOutcome, InferenceService, ModelStatus, Stage};
