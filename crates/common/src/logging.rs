use crate::config::{Environment, LogLevel};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Workspace crates that follow the configured level; everything else logs
/// at `warn` unless `RUST_LOG` says otherwise.
const SERVICE_TARGETS: [&str; 4] = ["gateway", "inference", "preprocess", "common"];

/// Directive string used when `RUST_LOG` is unset.
pub fn default_directives(log_level: LogLevel) -> String {
    let level = log_level.as_str();
    let mut directives = String::from("warn");
    for target in SERVICE_TARGETS {
        directives.push_str(&format!(",{}={}", target, level));
    }
    directives
}

pub(crate) fn env_filter(log_level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)))
}

/// Installs the global subscriber: pretty output in development, JSON lines
/// with the current span in production.
///
/// Also adds an OpenTelemetry layer that exports traces if a global tracer provider
/// has been initialized. Use [`crate::TelemetryGuard::init`] instead when an
/// OTLP endpoint is configured.
pub fn setup_logging(log_level: LogLevel, environment: Environment) {
    let registry = tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_opentelemetry::layer());

    match environment {
        Environment::Production => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_level(true),
                )
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}
