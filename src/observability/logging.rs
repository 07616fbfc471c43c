//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber
//! - Select pretty or JSON output
//! - Resolve the log level from `RUST_LOG`, falling back to config
//!
//! Events emitted while a request is in flight are recorded inside the request span,
//! so each line carries `trace_id` and `span_id` (the node id of this hop).

use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{
        self,
        format::{Format, Json, JsonFields},
        MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(
    config: &ObservabilityConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let json = config.log_format == LogFormat::Json;
    let json_output = json.then(|| json_layer(std::io::stdout));
    let pretty_output = (!json).then(|| fmt::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(json_output)
        .with(pretty_output)
        .try_init()
}

/// JSON line layer. Each line carries the fields of the innermost span under `span`.
pub fn json_layer<S, W>(writer: W) -> fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer)
}
