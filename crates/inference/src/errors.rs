use crate::service::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Stable tag for every failure the service can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedFormat,
    CorruptImage,
    PayloadTooLarge,
    NoModelLoaded,
    ModelLoadError,
    InferenceError,
    EncodeError,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::CorruptImage => "corrupt_image",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::NoModelLoaded => "no_model_loaded",
            ErrorKind::ModelLoadError => "model_load_error",
            ErrorKind::InferenceError => "inference_error",
            ErrorKind::EncodeError => "encode_error",
            ErrorKind::Timeout => "timeout",
        }
    }

    /// True when the caller can fix the failure by changing its request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::UnsupportedFormat
                | ErrorKind::CorruptImage
                | ErrorKind::PayloadTooLarge
                | ErrorKind::NoModelLoaded
                | ErrorKind::Timeout
        )
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt image: {0}")]
    CorruptImage(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Unknown model '{name}'. Available models: {available}")]
    UnknownModel { name: String, available: String },

    #[error("Model '{name}' not found at {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error("Malformed model '{name}': {reason}")]
    Malformed { name: String, reason: String },

    #[error("Model load for '{name}' was aborted: {reason}")]
    Aborted { name: String, reason: String },
}

impl ModelLoadError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ModelLoadError
    }

    /// The requested name does not resolve to any weights.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ModelLoadError::UnknownModel { .. } | ModelLoadError::NotFound { .. }
        )
    }
}

/// Opaque failure reported by a [`crate::DetectionModel`].
#[derive(Error, Debug)]
#[error("{0}")]
pub struct InferError(String);

impl InferError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<anyhow::Error> for InferError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{:#}", err))
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("No model loaded")]
pub struct NoModelLoaded;

/// Terminal `Failed(kind)` state of a detect request.
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt image: {0}")]
    CorruptImage(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("No model loaded. Load a model with POST /load_model first")]
    NoModelLoaded,

    #[error("Inference failed: {0}")]
    Inference(#[from] InferError),

    #[error("Failed to encode annotated image: {0}")]
    Encode(String),

    #[error("Deadline exceeded after the {stage} stage")]
    Timeout { stage: Stage },
}

impl DetectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            DetectError::CorruptImage(_) => ErrorKind::CorruptImage,
            DetectError::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            DetectError::NoModelLoaded => ErrorKind::NoModelLoaded,
            DetectError::Inference(_) => ErrorKind::InferenceError,
            DetectError::Encode(_) => ErrorKind::EncodeError,
            DetectError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

impl From<CodecError> for DetectError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedFormat(msg) => DetectError::UnsupportedFormat(msg),
            CodecError::CorruptImage(msg) => DetectError::CorruptImage(msg),
            CodecError::PayloadTooLarge(msg) => DetectError::PayloadTooLarge(msg),
            CodecError::Encode(msg) => DetectError::Encode(msg),
        }
    }
}

impl From<NoModelLoaded> for DetectError {
    fn from(_: NoModelLoaded) -> Self {
        DetectError::NoModelLoaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_errors_map_to_matching_kinds() {
        let cases = [
            (
                CodecError::UnsupportedFormat("x".into()),
                ErrorKind::UnsupportedFormat,
            ),
            (CodecError::CorruptImage("x".into()), ErrorKind::CorruptImage),
            (
                CodecError::PayloadTooLarge("x".into()),
                ErrorKind::PayloadTooLarge,
            ),
            (CodecError::Encode("x".into()), ErrorKind::EncodeError),
        ];

        for (codec_err, expected) in cases {
            let detect_err: DetectError = codec_err.into();
            assert_eq!(detect_err.kind(), expected);
        }
    }

    #[test]
    fn test_no_model_loaded_is_distinct_and_client_facing() {
        let err: DetectError = NoModelLoaded.into();
        assert_eq!(err.kind(), ErrorKind::NoModelLoaded);
        assert!(err.kind().is_client_error());
        assert!(
            err.to_string().contains("No model loaded"),
            "message should be actionable, got: {}",
            err
        );
    }

    #[test]
    fn test_server_side_kinds_are_not_client_errors() {
        assert!(!ErrorKind::InferenceError.is_client_error());
        assert!(!ErrorKind::EncodeError.is_client_error());
        assert!(!ErrorKind::ModelLoadError.is_client_error());
    }

    #[test]
    fn test_infer_error_from_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("tensor shape mismatch").context("running session");
        let infer: InferError = err.into();
        assert_eq!(infer.to_string(), "running session: tensor shape mismatch");
    }

    #[test]
    fn test_model_load_error_display_and_classification() {
        let err = ModelLoadError::UnknownModel {
            name: "resnet".into(),
            available: "yolov8n, yolov8s".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown model 'resnet'. Available models: yolov8n, yolov8s"
        );
        assert!(err.is_not_found());
        assert_eq!(err.kind(), ErrorKind::ModelLoadError);

        let err = ModelLoadError::Malformed {
            name: "yolov8n".into(),
            reason: "bad protobuf".into(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_timeout_names_the_stage() {
        let err = DetectError::Timeout {
            stage: Stage::Inferred,
        };
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.to_string(), "Deadline exceeded after the inferred stage");
    }

    #[test]
    fn test_kind_tags_are_unique() {
        let kinds = [
            ErrorKind::UnsupportedFormat,
            ErrorKind::CorruptImage,
            ErrorKind::PayloadTooLarge,
            ErrorKind::NoModelLoaded,
            ErrorKind::ModelLoadError,
            ErrorKind::InferenceError,
            ErrorKind::EncodeError,
            ErrorKind::Timeout,
        ];
        let tags: std::collections::HashSet<_> = kinds.iter().map(|k| k.as_str()).collect();
        assert_eq!(tags.len(), kinds.len());
    }
}
