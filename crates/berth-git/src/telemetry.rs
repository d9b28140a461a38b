//! Tracing initialisation for hosts embedding berth.
//!
//! Call [`init_tracing`] once at program start. The global subscriber can
//! only be installed once per process; later calls (from other tests in
//! the same binary, say) report `false` and change nothing, so it is safe
//! to sprinkle into test setup.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Output shape for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines for terminals.
    Text,
    /// Newline-delimited JSON for log aggregation pipelines.
    Json,
}

/// Install the global tracing subscriber for berth.
///
/// `default_level` applies when `RUST_LOG` is unset; `RUST_LOG` wins when
/// both are present. Returns whether this call installed the subscriber —
/// `false` means one was already in place and nothing changed.
pub fn init_tracing(format: LogFormat, default_level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .is_ok(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .is_ok(),
    }
}
