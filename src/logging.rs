/// Tracing subscriber setup
use crate::config::{LogFormat, LoggingConfig};
use crate::error::{ConverterError, ConverterResult};
use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub fn default_directive(config: &LoggingConfig) -> String {
    format!("mbrole_converter={}", config.level.level_filter())
}

/// Install the global subscriber
///
/// Log lines go to stdout unless a log file is configured, in which case
/// they are appended to it.
pub fn init(config: &LoggingConfig) -> ConverterResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)));

    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stdout),
    };
    let ansi = config.file.is_none();

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(writer).with_ansi(ansi))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
    };

    installed.map_err(|e| ConverterError::Config(format!("Failed to install logger: {}", e)))
}
