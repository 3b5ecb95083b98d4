/// Diagnostic events emitted by validation and resolution
///
/// Components never log through a global; they receive a `DiagnosticSink`
/// and hand it structured events. The binary wires in `TracingSink`.
use std::fmt;
use std::str::FromStr;

/// Closed set of severities accepted at the configuration boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warn",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    /// Tracing has no critical level; it shares ERROR with `Error`
    pub fn level_filter(&self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;
        match self {
            Severity::Debug => LevelFilter::DEBUG,
            Severity::Info => LevelFilter::INFO,
            Severity::Warning => LevelFilter::WARN,
            Severity::Error | Severity::Critical => LevelFilter::ERROR,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            other => Err(format!(
                "invalid log level '{}'; valid values are: debug, info, warn, error, critical",
                other
            )),
        }
    }
}

/// What a diagnostic is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A validation check passed
    ValidationCheck,
    /// A validation check failed
    ValidationFailure,
    /// An identifier had no row at hop 1 or hop 2
    LookupMiss,
    /// An identifier maps to more than one canonical key
    AmbiguousSource,
    /// One identifier finished resolving
    Progress,
    /// End-of-run counts
    Summary,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::ValidationCheck => "validation_check",
            DiagnosticKind::ValidationFailure => "validation_failure",
            DiagnosticKind::LookupMiss => "lookup_miss",
            DiagnosticKind::AmbiguousSource => "ambiguous_source",
            DiagnosticKind::Progress => "progress",
            DiagnosticKind::Summary => "summary",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// Identifier, field or path the event concerns
    pub subject: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            subject: None,
            message: message.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// Destination for diagnostics
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the installed `tracing` subscriber
#[derive(Debug, Clone)]
pub struct TracingSink {
    threshold: Severity,
}

impl TracingSink {
    pub fn new(threshold: Severity) -> Self {
        Self { threshold }
    }
}

impl DiagnosticSink for TracingSink {
    fn emit(&self, d: Diagnostic) {
        if d.severity < self.threshold {
            return;
        }

        let kind = d.kind.as_str();
        let subject = d.subject.as_deref().unwrap_or("");
        match d.severity {
            Severity::Debug => tracing::debug!(kind, subject, "{}", d.message),
            Severity::Info => tracing::info!(kind, subject, "{}", d.message),
            Severity::Warning => tracing::warn!(kind, subject, "{}", d.message),
            Severity::Error => tracing::error!(kind, subject, "{}", d.message),
            Severity::Critical => {
                tracing::error!(kind, subject, critical = true, "{}", d.message)
            }
        }
    }
}

/// Records every diagnostic in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<Diagnostic>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> Vec<Diagnostic> {
        self.events()
            .into_iter()
            .filter(|d| d.kind == kind)
            .collect()
    }
}

#[cfg(test)]
impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.events.lock().unwrap().push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_severity() {
        assert_eq!("debug".parse::<Severity>().unwrap(), Severity::Debug);
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::default();
        sink.emit(
            Diagnostic::new(Severity::Info, DiagnosticKind::Progress, "one").with_subject("C001"),
        );
        sink.emit(Diagnostic::new(Severity::Warning, DiagnosticKind::LookupMiss, "two"));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].subject.as_deref(), Some("C001"));
        assert_eq!(sink.of_kind(DiagnosticKind::LookupMiss).len(), 1);
    }
}
