use common::{Environment, LogLevel};
use inference::{
    AnnotatorConfig, CodecConfig, DetectorConfig, InferenceConfig, OutputFormat,
    annotate::DEFAULT_FONT_PATH,
};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub max_image_dimension: u32,
    pub request_timeout_ms: u64,
    /// Loaded at startup; empty disables the startup load.
    pub default_model: String,
    pub models_dir: PathBuf,
    /// Empty draws labels without text.
    pub font_path: String,
    pub output_format: OutputFormat,
    pub jpeg_quality: u8,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    pub otel_endpoint: Option<String>,
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn default_model(&self) -> Option<&str> {
        let name = self.default_model.trim();
        (!name.is_empty()).then_some(name)
    }

    pub fn inference_config(&self) -> InferenceConfig {
        let font_path = self.font_path.trim();
        InferenceConfig {
            codec: CodecConfig {
                max_upload_bytes: self.max_upload_bytes,
                max_image_dimension: self.max_image_dimension,
                output_format: self.output_format,
                jpeg_quality: self.jpeg_quality.clamp(1, 100),
            },
            annotator: AnnotatorConfig::default(),
            font_path: (!font_path.is_empty()).then(|| PathBuf::from(font_path)),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.input_size == 0 {
            return Err(config::ConfigError::Message(
                "input_size must be greater than 0".to_string(),
            ));
        }
        if self.max_image_dimension == 0 {
            return Err(config::ConfigError::Message(
                "max_image_dimension must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            input_size: (self.input_size, self.input_size),
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            ..DetectorConfig::default()
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8000)?
        .set_default("max_upload_bytes", 10 * 1024 * 1024)?
        .set_default("max_image_dimension", 8192)?
        .set_default("request_timeout_ms", 30_000)?
        .set_default("default_model", "yolov8n")?
        .set_default("models_dir", "models")?
        .set_default("font_path", DEFAULT_FONT_PATH)?
        .set_default("output_format", "jpeg")?
        .set_default("jpeg_quality", 90)?
        .set_default("confidence_threshold", 0.25)?
        .set_default("iou_threshold", 0.7)?
        .set_default("input_size", 640)?
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
