//! Logging setup.
//!
//! Console output honors `RUST_LOG`; `LOG_FORMAT=json` switches to line
//! JSON for log shippers, and setting `LOG_DIR` adds a daily-rolling file
//! output.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "peakwatch=info,tower_http=warn";

/// Initialize the global subscriber.
///
/// Returns the file appender guard when file logging is enabled; it must be
/// kept alive for the process lifetime.
pub fn init(log_dir: Option<&str>, json: bool) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_plain = (!json).then(|| fmt::layer());
    let console_json = json.then(|| fmt::layer().json());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "peakwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_plain)
        .with(console_json)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to set global default subscriber: {e}")))?;

    Ok(guard)
}
