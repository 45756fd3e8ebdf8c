use crate::{error::ApiError, state::AppState};
use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use inference::{DetectError, DetectOutcome, Detection, ModelInfo, catalog::DEFAULT_MODEL};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_name: Option<String>,
    pub generation: Option<u64>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.service.status();
    Json(HealthResponse {
        status: "ok",
        model_loaded: status.model_loaded,
        model_name: status.model_name,
        generation: status.generation,
    })
}

pub async fn models(State(state): State<AppState>) -> Json<Vec<ModelInfo>> {
    Json(state.service.available_models())
}

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    #[serde(default = "default_model_name")]
    pub model_name: String,
}

fn default_model_name() -> String {
    DEFAULT_MODEL.to_string()
}

#[derive(Debug, Serialize)]
pub struct LoadModelResponse {
    pub status: &'static str,
    pub message: String,
    pub model_name: String,
    pub generation: u64,
}

/// An empty body loads the default model.
pub async fn load_model(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LoadModelResponse>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        LoadModelRequest {
            model_name: default_model_name(),
        }
    } else {
        serde_json::from_slice::<LoadModelRequest>(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?
    };

    let handle = state.service.load_model(&request.model_name).await?;

    Ok(Json(LoadModelResponse {
        status: "success",
        message: format!("Model {} loaded successfully", handle.name),
        model_name: handle.name.clone(),
        generation: handle.generation,
    }))
}

/// What `/detect` sends back on success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// The annotated image in the configured output format.
    #[default]
    Image,
    /// The detections as JSON, without the image.
    Json,
}

#[derive(Debug, Deserialize)]
pub struct DetectParams {
    /// Request deadline in seconds.
    pub timeout: Option<f64>,
    #[serde(default)]
    pub response: ResponseKind,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub model_name: String,
    pub generation: u64,
    pub width: u32,
    pub height: u32,
    /// Seconds spent in the pipeline.
    pub processing_time: f64,
    pub detections: Vec<Detection>,
}

impl From<DetectOutcome> for DetectResponse {
    fn from(outcome: DetectOutcome) -> Self {
        Self {
            model_name: outcome.model_name,
            generation: outcome.generation,
            width: outcome.width,
            height: outcome.height,
            processing_time: outcome.processing_time.as_secs_f64(),
            detections: outcome.detections,
        }
    }
}

/// Parses the `timeout` query value. Values too large for a `Duration` are
/// rejected; the service caps the rest.
fn parse_timeout(secs: Option<f64>) -> Result<Option<Duration>, ApiError> {
    let Some(secs) = secs else {
        return Ok(None);
    };
    let invalid = || {
        ApiError::BadRequest(format!(
            "timeout must be a positive number of seconds, got {}",
            secs
        ))
    };
    if !(secs.is_finite() && secs > 0.0) {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| invalid())
}

pub async fn detect(
    State(state): State<AppState>,
    params: Result<Query<DetectParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let timeout = parse_timeout(params.timeout)?;

    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(IMAGE_FIELD) {
            image = Some(field.bytes().await.map_err(multipart_error)?);
            break;
        }
    }
    let image = image.ok_or_else(|| {
        ApiError::BadRequest(format!("No '{}' field in request", IMAGE_FIELD))
    })?;

    let outcome = state.service.detect(image.to_vec(), timeout).await?;

    if params.response == ResponseKind::Json {
        return Ok(Json(DetectResponse::from(outcome)).into_response());
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(outcome.content_type),
    );
    headers.insert(
        "x-model-name",
        HeaderValue::from_str(&outcome.model_name)
            .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    );
    headers.insert("x-model-generation", HeaderValue::from(outcome.generation));
    headers.insert(
        "x-detection-count",
        HeaderValue::from(outcome.detections.len()),
    );
    headers.insert(
        "x-processing-time-ms",
        HeaderValue::from(outcome.processing_time.as_millis() as u64),
    );

    Ok((StatusCode::OK, headers, outcome.bytes).into_response())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::Detect(DetectError::PayloadTooLarge(err.body_text()))
    } else {
        ApiError::BadRequest(format!("Multipart error: {}", err.body_text()))
    }
}
