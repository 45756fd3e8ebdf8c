use crate::{
    annotate::Annotator,
    codec::ImageCodec,
    config::{DEFAULT_REQUEST_TIMEOUT, InferenceConfig, MAX_REQUEST_TIMEOUT},
    detection::Detection,
    errors::{DetectError, ErrorKind, InferError, ModelLoadError},
    model::ModelInfo,
    registry::{ModelHandle, ModelRegistry},
};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use serde::Serialize;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

/// Progress of a detect request. `Failed(kind)` is carried by [`DetectError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Stage {
    Received = 0,
    Decoded = 1,
    ModelResolved = 2,
    Inferred = 3,
    Annotated = 4,
    Encoded = 5,
    Responded = 6,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Decoded => "decoded",
            Stage::ModelResolved => "model_resolved",
            Stage::Inferred => "inferred",
            Stage::Annotated => "annotated",
            Stage::Encoded => "encoded",
            Stage::Responded => "responded",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Stage::Received,
            1 => Stage::Decoded,
            2 => Stage::ModelResolved,
            3 => Stage::Inferred,
            4 => Stage::Annotated,
            5 => Stage::Encoded,
            _ => Stage::Responded,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful result of a detect request.
#[derive(Debug, Clone)]
pub struct DetectOutcome {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub model_name: String,
    pub generation: u64,
    /// Detections as drawn, clipped to the source image.
    pub detections: Vec<Detection>,
    pub width: u32,
    pub height: u32,
    pub processing_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub model_loaded: bool,
    pub model_name: Option<String>,
    pub generation: Option<u64>,
}

struct Metrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
    failures: Counter<u64>,
    detections: Counter<u64>,
    model_loads: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> Metrics {
    let meter = global::meter(meter_name);
    let latency_buckets = [
        0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0, 10.0, 30.0,
    ];

    Metrics {
        duration: meter
            .f64_histogram("detect_duration_seconds")
            .with_description("Time to serve a detect request (decode + infer + annotate + encode)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build(),
        requests: meter
            .u64_counter("detect_requests_total")
            .with_description("Total detect requests received")
            .build(),
        failures: meter
            .u64_counter("detect_failures_total")
            .with_description("Total detect requests that failed, by kind")
            .build(),
        detections: meter
            .u64_counter("detections_total")
            .with_description("Total detections returned")
            .build(),
        model_loads: meter
            .u64_counter("model_loads_total")
            .with_description("Model load attempts, by outcome")
            .build(),
    }
}

struct Pipeline {
    registry: Arc<ModelRegistry>,
    codec: ImageCodec,
    annotator: Annotator,
    config: InferenceConfig,
    metrics: Metrics,
}

impl Pipeline {
    /// Budget and absolute deadline for a request starting at `started`.
    /// The budget is capped at [`MAX_REQUEST_TIMEOUT`].
    fn deadline(&self, started: Instant, timeout: Option<Duration>) -> (Duration, Instant) {
        let budget = timeout
            .unwrap_or(self.config.request_timeout)
            .min(MAX_REQUEST_TIMEOUT);
        let deadline = started
            .checked_add(budget)
            .or_else(|| started.checked_add(DEFAULT_REQUEST_TIMEOUT))
            .unwrap_or(started);
        (budget, deadline)
    }

    /// Runs one request through every stage, checking the deadline at each
    /// boundary. `progress` always holds the last stage reached.
    fn run(
        &self,
        bytes: &[u8],
        deadline: Instant,
        progress: &AtomicU8,
    ) -> Result<DetectOutcome, DetectError> {
        let started = Instant::now();
        let reach = |stage: Stage| -> Result<(), DetectError> {
            progress.store(stage as u8, Ordering::SeqCst);
            if Instant::now() >= deadline {
                return Err(DetectError::Timeout { stage });
            }
            Ok(())
        };

        reach(Stage::Received)?;

        let image = {
            let _s = common::span!("decode");
            self.codec.decode(bytes)?
        };
        reach(Stage::Decoded)?;

        // One snapshot per request; a concurrent swap does not affect it
        let handle = self.registry.current()?;
        reach(Stage::ModelResolved)?;

        let raw = {
            let _s = common::span!("model_inference");
            handle.infer(&image)?
        };
        reach(Stage::Inferred)?;

        let (width, height) = image.dimensions();
        let detections: Vec<Detection> = raw
            .iter()
            .filter_map(|d| d.clipped(width, height))
            .collect();

        let annotated = {
            let _s = common::span!("annotate");
            self.annotator.draw(&image, &detections)
        };
        reach(Stage::Annotated)?;

        let encoded = {
            let _s = common::span!("encode");
            self.codec.encode(&annotated)?
        };
        reach(Stage::Encoded)?;

        progress.store(Stage::Responded as u8, Ordering::SeqCst);
        Ok(DetectOutcome {
            bytes: encoded.bytes,
            content_type: encoded.content_type,
            model_name: handle.name.clone(),
            generation: handle.generation,
            detections,
            width,
            height,
            processing_time: started.elapsed(),
        })
    }

    fn observe(&self, result: &Result<DetectOutcome, DetectError>, started: Instant) {
        self.metrics.requests.add(1, &[]);
        self.metrics
            .duration
            .record(started.elapsed().as_secs_f64(), &[]);

        match result {
            Ok(outcome) => {
                self.metrics
                    .detections
                    .add(outcome.detections.len() as u64, &[]);
                tracing::info!(
                    model = %outcome.model_name,
                    generation = outcome.generation,
                    detections = outcome.detections.len(),
                    width = outcome.width,
                    height = outcome.height,
                    elapsed_ms = outcome.processing_time.as_millis() as u64,
                    "Detect request served"
                );
            }
            Err(e) => {
                let kind = e.kind();
                self.metrics
                    .failures
                    .add(1, &[KeyValue::new("kind", kind.as_str())]);
                if kind.is_client_error() {
                    tracing::warn!(kind = kind.as_str(), error = %e, "Detect request rejected");
                } else {
                    tracing::error!(kind = kind.as_str(), error = %e, "Detect request failed");
                }
            }
        }
    }
}

/// Orchestrates detect requests and model loads over one [`ModelRegistry`].
///
/// Cheap to clone; all clones share the registry and pipeline.
#[derive(Clone)]
pub struct InferenceService {
    pipeline: Arc<Pipeline>,
}

impl InferenceService {
    pub fn new(registry: Arc<ModelRegistry>, config: InferenceConfig) -> Self {
        let annotator = match &config.font_path {
            Some(path) => Annotator::with_font_file(config.annotator.clone(), path),
            None => {
                tracing::warn!("No label font configured, labels will be drawn without text");
                Annotator::new(config.annotator.clone(), None)
            }
        };

        let pipeline = Pipeline {
            registry,
            codec: ImageCodec::new(config.codec.clone()),
            annotator,
            config,
            metrics: init_metrics("inference"),
        };

        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.pipeline.registry
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.pipeline.config
    }

    /// Runs the detect pipeline on the blocking pool.
    ///
    /// `timeout` defaults to the configured request timeout. When it expires
    /// the caller gets `Timeout` naming the last stage reached; the blocking
    /// task stops at its next stage boundary.
    #[tracing::instrument(skip_all, fields(bytes = bytes.len()))]
    pub async fn detect(
        &self,
        bytes: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<DetectOutcome, DetectError> {
        let started = Instant::now();
        let (budget, deadline) = self.pipeline.deadline(started, timeout);
        let progress = Arc::new(AtomicU8::new(Stage::Received as u8));

        let pipeline = Arc::clone(&self.pipeline);
        let task_progress = Arc::clone(&progress);
        let span = tracing::Span::current();
        let task = tokio::task::spawn_blocking(move || {
            span.in_scope(|| pipeline.run(&bytes, deadline, &task_progress))
        });

        let result = match tokio::time::timeout(budget, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DetectError::Inference(InferError::new(format!(
                "detect task aborted: {}",
                join_err
            )))),
            Err(_) => Err(DetectError::Timeout {
                stage: Stage::from_u8(progress.load(Ordering::SeqCst)),
            }),
        };

        self.pipeline.observe(&result, started);
        result
    }

    /// Same pipeline as [`detect`](Self::detect) on the calling thread.
    pub fn detect_blocking(
        &self,
        bytes: &[u8],
        timeout: Option<Duration>,
    ) -> Result<DetectOutcome, DetectError> {
        let started = Instant::now();
        let (_, deadline) = self.pipeline.deadline(started, timeout);
        let progress = AtomicU8::new(Stage::Received as u8);

        let result = self.pipeline.run(bytes, deadline, &progress);
        self.pipeline.observe(&result, started);
        result
    }

    /// Loads `name` and makes it the active model. On failure the active
    /// model is left as it was.
    #[tracing::instrument(skip(self))]
    pub async fn load_model(&self, name: &str) -> Result<Arc<ModelHandle>, ModelLoadError> {
        let registry = Arc::clone(&self.pipeline.registry);
        let requested = name.to_string();
        let span = tracing::Span::current();

        tracing::info!("Loading model");
        let loaded = tokio::task::spawn_blocking(move || {
            span.in_scope(|| registry.load(&requested))
        })
        .await
        .unwrap_or_else(|join_err| {
            Err(ModelLoadError::Aborted {
                name: name.to_string(),
                reason: join_err.to_string(),
            })
        });

        match loaded {
            Ok(handle) => {
                let previous = self.pipeline.registry.swap(Arc::clone(&handle));
                self.pipeline
                    .metrics
                    .model_loads
                    .add(1, &[KeyValue::new("outcome", "success")]);
                tracing::info!(
                    model = %handle.name,
                    generation = handle.generation,
                    previous = previous.as_ref().map(|p| p.name.as_str()),
                    "Model swapped in"
                );
                Ok(handle)
            }
            Err(e) => {
                self.pipeline
                    .metrics
                    .model_loads
                    .add(1, &[KeyValue::new("outcome", "failure")]);
                tracing::error!(
                    kind = ErrorKind::ModelLoadError.as_str(),
                    error = %e,
                    "Model load failed, keeping active model"
                );
                Err(e)
            }
        }
    }

    pub fn status(&self) -> ModelStatus {
        match self.pipeline.registry.current() {
            Ok(handle) => ModelStatus {
                model_loaded: true,
                model_name: Some(handle.name.clone()),
                generation: Some(handle.generation),
            },
            Err(_) => ModelStatus {
                model_loaded: false,
                model_name: None,
                generation: None,
            },
        }
    }

    pub fn available_models(&self) -> Vec<ModelInfo> {
        self.pipeline.registry.available_models()
    }
}

impl fmt::Debug for InferenceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceService")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
