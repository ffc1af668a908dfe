//! Tracing setup for processes hosting kernels.
//!
//! [`init_tracing`] installs one global subscriber built from a
//! [`RuntimeConfig`]:
//!
//! | Layer | Source |
//! |---|---|
//! | filter | `RUST_LOG`, else [`RuntimeConfig::log_filter`] |
//! | console | [`RuntimeConfig::log_format`] |
//! | OTLP/HTTP spans | [`RuntimeConfig::otlp_endpoint`], else `OTEL_EXPORTER_OTLP_ENDPOINT` |
//!
//! Exported spans include the `create_variant` / `create_instance` spans of
//! the kernel pipeline and the `run_until` span of
//! [`ComponentRunner`][crate::runner::ComponentRunner], under the tracer
//! [`TRACER_NAME`].
//!
//! ```rust,no_run
//! use logikern_runtime::config::RuntimeConfig;
//!
//! let guard = logikern_runtime::telemetry::init_tracing(&RuntimeConfig::from_env())
//!     .expect("no subscriber installed yet");
//! // ... run components; dropping `guard` flushes exported spans.
//! # drop(guard);
//! ```

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{ExporterBuildError, WithExportConfig};
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use thiserror::Error;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

use crate::config::{LogFormat, RuntimeConfig};

/// Instrumentation scope of every exported span.
pub const TRACER_NAME: &str = "logikern-runtime";

const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Failures installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("OTLP exporter for {endpoint} could not be built: {source}")]
    Exporter {
        endpoint: String,
        source: ExporterBuildError,
    },

    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Install the global subscriber described by `config`.
///
/// Hold the returned guard until the process exits; dropping it shuts the
/// exporter down and flushes pending spans.
///
/// # Errors
///
/// [`TelemetryError::Exporter`] when an endpoint is configured but the
/// exporter cannot be built, [`TelemetryError::AlreadyInstalled`] on a second
/// call.
pub fn init_tracing(config: &RuntimeConfig) -> Result<TracerProviderGuard, TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let console: Box<dyn Layer<Registry> + Send + Sync> = match config.log_format {
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    let provider = match otlp_endpoint(config) {
        Some(endpoint) => Some(build_provider(&config.service_name, endpoint)?),
        None => None,
    };
    let spans = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));

    tracing_subscriber::registry()
        .with(console)
        .with(filter)
        .with(spans)
        .try_init()?;
    Ok(TracerProviderGuard(provider))
}

/// Shuts the span exporter down on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// `true` when spans are being exported to a collector.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[logikern] span exporter shutdown failed: {e}");
        }
    }
}

/// Collector URL from the config, falling back to the standard OTel variable.
fn otlp_endpoint(config: &RuntimeConfig) -> Option<String> {
    config
        .otlp_endpoint
        .clone()
        .or_else(|| std::env::var(OTLP_ENDPOINT_VAR).ok())
        .filter(|url| !url.is_empty())
}

fn build_provider(service_name: &str, endpoint: String) -> Result<SdkTracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint.clone())
        .build()
        .map_err(|source| TelemetryError::Exporter { endpoint, source })?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build();

    // Ticks run synchronously with no async runtime for a batch exporter.
    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_simple_exporter(exporter)
        .build())
}
