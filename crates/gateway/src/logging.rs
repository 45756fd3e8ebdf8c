use crate::config::Config;
use common::TelemetryGuard;

pub const SERVICE_NAME: &str = "gateway";

/// Installs the global subscriber. With an OTLP endpoint configured the
/// returned guard must be kept alive to flush traces and metrics on exit.
pub fn setup_logging(config: &Config) -> anyhow::Result<Option<TelemetryGuard>> {
    match config.otel_endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
        Some(endpoint) => {
            let guard =
                TelemetryGuard::init(SERVICE_NAME, endpoint, config.log_level, config.environment)?;
            Ok(Some(guard))
        }
        None => {
            common::setup_logging(config.log_level, config.environment);
            Ok(None)
        }
    }
}
