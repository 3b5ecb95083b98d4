/// MBROLE converter - metabolite identifier conversion
///
/// Converts compound identifiers from one metabolomics catalog to another.
/// Two identifiers name the same compound when they share an InChIKey in
/// the conversion table of a SQLite database.

mod config;
mod converter;
mod db;
mod diagnostics;
mod error;
mod logging;
mod resolver;
mod streams;
mod validation;

use config::ConverterConfig;
use diagnostics::TracingSink;
use error::ConverterError;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = ConverterConfig::load();
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        return ExitCode::from(e.exit_code());
    }

    // Initialize logging
    if let Err(e) = logging::init(&config.logging) {
        eprintln!("{}", e);
        return ExitCode::from(e.exit_code());
    }

    let sink = TracingSink::new(config.logging.level);
    match converter::run(&config, &sink).await {
        Ok(report) => {
            tracing::debug!(
                total = report.summary.total,
                matched = report.summary.matched,
                targets = report.targets,
                "Conversion finished"
            );
            ExitCode::SUCCESS
        }
        Err(e @ ConverterError::Validation(_)) => {
            tracing::error!("Input commands not valid. Exiting...");
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            tracing::error!(error = %e, "Conversion aborted");
            ExitCode::from(e.exit_code())
        }
    }
}
