use crate::{annotate::AnnotatorConfig, codec::CodecConfig};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on any per-request deadline, caller-supplied or configured.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub codec: CodecConfig,
    pub annotator: AnnotatorConfig,
    /// TTF used for label text; labels are drawn without text when `None`
    /// or unreadable.
    pub font_path: Option<PathBuf>,
    /// Deadline applied to a detect request when the caller gives none.
    pub request_timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            codec: CodecConfig::default(),
            annotator: AnnotatorConfig::default(),
            font_path: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl InferenceConfig {
    /// Create default configuration for testing
    pub fn test_default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }
}
