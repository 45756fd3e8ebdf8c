use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use inference::{DetectError, ModelLoadError};
use serde_json::json;

/// Every failure a handler can return, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Detect(DetectError),
    ModelLoad(ModelLoadError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Detect(e) => match e {
                DetectError::UnsupportedFormat(_) | DetectError::CorruptImage(_) => {
                    StatusCode::BAD_REQUEST
                }
                DetectError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                DetectError::NoModelLoaded => StatusCode::SERVICE_UNAVAILABLE,
                DetectError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
                DetectError::Inference(_) | DetectError::Encode(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::ModelLoad(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::ModelLoad(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Detect(e) => e.to_string(),
            ApiError::ModelLoad(e) => format!("Failed to load model: {}", e),
        }
    }
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        ApiError::Detect(err)
    }
}

impl From<ModelLoadError> for ApiError {
    fn from(err: ModelLoadError) -> Self {
        ApiError::ModelLoad(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, Json(json!({ "detail": self.detail() }))).into_response();
        if let ApiError::Detect(e) = &self {
            response
                .headers_mut()
                .insert("x-error-kind", HeaderValue::from_static(e.kind().as_str()));
        }
        response
    }
}
