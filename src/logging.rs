/*!
 * Logging and tracing initialization
 */

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{CheckupConfig, LogFormat};
use crate::error::{CheckupError, Result};

const DEFAULT_FILTER: &str = "orbit_checkup=info,orbit_sentinel=info";
const VERBOSE_FILTER: &str = "orbit_checkup=debug,orbit_sentinel=debug";

/// Initialize structured logging based on configuration
///
/// `RUST_LOG` takes precedence over `--verbose`.
pub fn init_logging(config: &CheckupConfig) -> Result<()> {
    let env_filter = build_filter(config.verbose)?;

    let installed = match config.log_format {
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE)
                .compact();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_span_events(FmtSpan::NONE)
                .with_ansi(false)
                .json();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
        }
    };

    installed.map_err(|e| CheckupError::Config(format!("Failed to install log subscriber: {}", e)))
}

fn build_filter(verbose: bool) -> Result<EnvFilter> {
    let fallback = if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    };

    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .map_err(|e| CheckupError::Config(format!("Failed to create log filter: {}", e)))
}

/// Initialize logging with custom format for testing
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("orbit_checkup=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    });
}
