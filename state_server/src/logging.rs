use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Default log levels. Override using the `RUST_LOG` env variable.
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_LEVEL_DEBUG: &str = "debug";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub debug: bool,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    fn default_level(&self) -> &'static str {
        if self.debug {
            DEFAULT_LOG_LEVEL_DEBUG
        } else {
            DEFAULT_LOG_LEVEL
        }
    }
}

/// Sets up console logging. Only the first call in a process has any effect.
pub fn init_logging(cfg: &LoggingConfig) {
    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_file(true)
        .with_target(false);
    let fmt_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(cfg.default_level()))
        .unwrap_or_default();

    let registry = tracing_subscriber::registry();
    let result = match cfg.format {
        LogFormat::Json => registry.with(fmt_layer_base.json().with_filter(fmt_filter)).try_init(),
        LogFormat::Text => registry.with(fmt_layer_base.with_filter(fmt_filter)).try_init(),
    };

    // Err means a subscriber is already installed, e.g. by a test harness.
    if result.is_ok() && cfg.debug {
        tracing::debug!("debug mode on");
    }
}
