/// Configuration management for the converter
use crate::diagnostics::Severity;
use crate::error::{ConverterError, ConverterResult};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Default relation holding the identifier / InChIKey / catalog rows
pub const DEFAULT_TABLE: &str = "mbroleplus";
/// Default column naming the catalog each row belongs to
pub const DEFAULT_FIELD: &str = "database";
pub const DEFAULT_ID_COLUMN: &str = "id";
pub const DEFAULT_KEY_COLUMN: &str = "inchikey";
pub const DEFAULT_DISCARDED_FILE: &str = "discarded.txt";

/// Log line formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// How identifiers are looked up in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolutionStrategy {
    /// Scan the relation once and resolve from in-memory indices
    Indexed,
    /// Two point queries per identifier
    Point,
}

/// Command line interface
///
/// Every option can also be supplied through an `MBROLE_*` environment
/// variable, including ones loaded from a `.env` file.
#[derive(Parser, Debug, Clone)]
#[command(name = "mbrole-converter")]
#[command(about = "Convert compound identifiers between metabolomics catalogs")]
#[command(version)]
pub struct Cli {
    /// One-per-line file with the compounds to convert
    #[arg(short, long, env = "MBROLE_INPUT")]
    pub input: PathBuf,

    /// One-per-line file receiving the converted compounds (default: stdout)
    #[arg(short, long, env = "MBROLE_OUTPUT")]
    pub output: Option<PathBuf>,

    /// SQLite database with the conversion table
    #[arg(short = 'b', long = "database", visible_alias = "db", env = "MBROLE_DATABASE")]
    pub database: PathBuf,

    /// Table inside the database to use
    #[arg(short, long, default_value = DEFAULT_TABLE, env = "MBROLE_TABLE")]
    pub table: String,

    /// Column in which the catalog of each row is stored
    #[arg(short, long, default_value = DEFAULT_FIELD, env = "MBROLE_FIELD")]
    pub field: String,

    /// Column holding the per-catalog identifier
    #[arg(long, default_value = DEFAULT_ID_COLUMN, env = "MBROLE_ID_COLUMN")]
    pub id_column: String,

    /// Column holding the InChIKey shared across catalogs
    #[arg(long, default_value = DEFAULT_KEY_COLUMN, env = "MBROLE_KEY_COLUMN")]
    pub key_column: String,

    /// Catalog to convert to; must be a value of the --field column
    #[arg(long = "id", visible_alias = "target", env = "MBROLE_TARGET")]
    pub target: String,

    /// Input file is gzip compressed
    #[arg(long, visible_alias = "gzi", env = "MBROLE_GZIPPED_INPUT")]
    pub gzipped_input: bool,

    /// Compress the output with gzip
    #[arg(long, visible_alias = "gzo", env = "MBROLE_GZIPPED_OUTPUT")]
    pub gzipped_output: bool,

    /// Append log lines to this file (default: stdout)
    #[arg(short, long, env = "MBROLE_LOGFILE")]
    pub logfile: Option<PathBuf>,

    /// Minimum level to show in the log: debug, info, warn, error, critical
    #[arg(long, default_value = "info", env = "MBROLE_LOGLEVEL")]
    pub loglevel: Severity,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "MBROLE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// File receiving the compounds not found in the database
    #[arg(short, long, default_value = DEFAULT_DISCARDED_FILE, env = "MBROLE_DISCARDED_FILE")]
    pub discarded_file: PathBuf,

    /// Lookup strategy
    #[arg(long, value_enum, default_value_t = ResolutionStrategy::Indexed, env = "MBROLE_STRATEGY")]
    pub strategy: ResolutionStrategy,
}

/// Main converter configuration
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
    pub strategy: ResolutionStrategy,
}

/// Where identifiers come from
#[derive(Debug, Clone)]
pub struct InputConfig {
    pub path: PathBuf,
    pub gzipped: bool,
}

/// Where results go
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// `None` writes to stdout
    pub path: Option<PathBuf>,
    pub gzipped: bool,
    pub discarded: PathBuf,
}

/// Backing SQLite relation
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub database: PathBuf,
    pub table: String,
    pub field: String,
    pub id_column: String,
    pub key_column: String,
    pub target: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Severity,
    pub format: LogFormat,
    /// `None` logs to stdout
    pub file: Option<PathBuf>,
}

impl ConverterConfig {
    /// Load configuration from the command line and environment
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::from(Cli::parse())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConverterResult<()> {
        let names = [
            ("table", &self.catalog.table),
            ("field", &self.catalog.field),
            ("id column", &self.catalog.id_column),
            ("key column", &self.catalog.key_column),
            ("target", &self.catalog.target),
        ];
        for (what, value) in names {
            if value.trim().is_empty() {
                return Err(ConverterError::Config(format!("{} cannot be empty", what)));
            }
        }

        if self.output.path.as_ref() == Some(&self.output.discarded) {
            return Err(ConverterError::Config(format!(
                "Output and discarded file are the same path: {}",
                self.output.discarded.display()
            )));
        }

        Ok(())
    }
}

impl From<Cli> for ConverterConfig {
    fn from(cli: Cli) -> Self {
        Self {
            input: InputConfig {
                path: cli.input,
                gzipped: cli.gzipped_input,
            },
            output: OutputConfig {
                path: cli.output,
                gzipped: cli.gzipped_output,
                discarded: cli.discarded_file,
            },
            catalog: CatalogConfig {
                database: cli.database,
                table: cli.table,
                field: cli.field,
                id_column: cli.id_column,
                key_column: cli.key_column,
                target: cli.target,
            },
            logging: LoggingConfig {
                level: cli.loglevel,
                format: cli.log_format,
                file: cli.logfile,
            },
            strategy: cli.strategy,
        }
    }
}
