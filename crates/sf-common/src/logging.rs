//! Structured logging bootstrap
//!
//! Output format is chosen by `LOG_FORMAT` (`json` for log aggregation, anything
//! else for human-readable text) and filtering by `RUST_LOG`.
//!
//! ```rust,ignore
//! sf_common::logging::init_logging("sf-console", "warn");
//!
//! tracing::info!(role = %identity.role, "Session restored");
//! ```
//!
//! Session-layer code never places token values in log fields; only their
//! presence is recorded.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Read `LOG_FORMAT`; defaults to text.
    pub fn from_env() -> Self {
        let value = std::env::var("LOG_FORMAT").unwrap_or_default();
        Self::parse(&value)
    }

    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Initialize logging for `service_name`.
///
/// `default_level` applies when `RUST_LOG` is unset or unparsable. Calling this
/// more than once is harmless; later calls are ignored.
pub fn init_logging(service_name: &str, default_level: &str) {
    let env_filter = build_filter(default_level);

    let result = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .flatten_event(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .try_init(),
    };

    if result.is_ok() {
        tracing::debug!(service = service_name, "Logging initialized");
    }
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
