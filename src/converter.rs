/// Conversion run: validate, read, resolve, write
use crate::config::ConverterConfig;
use crate::db::catalog::RelationSchema;
use crate::db::CatalogStore;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
use crate::error::ConverterResult;
use crate::resolver::{Resolution, ResolutionSummary, Resolver};
use crate::streams;
use crate::validation::{ValidatedRelation, ValidationRequest, Validator};
use std::collections::BTreeSet;

/// What a finished run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub summary: ResolutionSummary,
    /// Distinct target identifiers written to the output
    pub targets: usize,
}

impl From<&ConverterConfig> for ValidationRequest {
    fn from(config: &ConverterConfig) -> Self {
        ValidationRequest {
            storage: config.catalog.database.clone(),
            schema: RelationSchema {
                table: config.catalog.table.clone(),
                id_column: config.catalog.id_column.clone(),
                key_column: config.catalog.key_column.clone(),
                tag_column: config.catalog.field.clone(),
            },
            target_tag: config.catalog.target.clone(),
            input: config.input.path.clone(),
            output: config.output.path.clone(),
            discarded: config.output.discarded.clone(),
        }
    }
}

/// Run a whole conversion
///
/// The catalog connection is closed before any output is written, whether
/// resolution succeeded or not.
pub async fn run(
    config: &ConverterConfig,
    sink: &dyn DiagnosticSink,
) -> ConverterResult<RunReport> {
    let request = ValidationRequest::from(config);
    let (mut store, relation) = Validator::new(sink).validate(&request).await?;

    let resolved = resolve(config, sink, &mut store, &relation).await;
    let closed = store.close().await;
    let resolution = resolved?;
    closed?;

    for (source, converted) in resolution.matched() {
        sink.emit(
            Diagnostic::new(
                Severity::Debug,
                DiagnosticKind::Progress,
                format!("{} -> {}", source, join(converted)),
            )
            .with_subject(source.as_str()),
        );
    }

    let targets = resolution.targets();
    streams::write_lines(
        config.output.path.as_deref(),
        config.output.gzipped,
        &targets,
    )?;
    streams::write_lines(
        Some(config.output.discarded.as_path()),
        false,
        resolution.unmatched(),
    )?;
    sink.emit(
        Diagnostic::new(
            Severity::Info,
            DiagnosticKind::Summary,
            format!(
                "Wrote {} converted IDs and {} discarded metabolites",
                targets.len(),
                resolution.unmatched().len()
            ),
        )
        .with_subject(config.output.discarded.display().to_string()),
    );

    Ok(RunReport {
        summary: resolution.summary(),
        targets: targets.len(),
    })
}

fn join(identifiers: &BTreeSet<String>) -> String {
    identifiers
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

async fn resolve(
    config: &ConverterConfig,
    sink: &dyn DiagnosticSink,
    store: &mut CatalogStore,
    relation: &ValidatedRelation,
) -> ConverterResult<Resolution> {
    let input = &config.input.path;
    sink.emit(
        Diagnostic::new(
            Severity::Info,
            DiagnosticKind::Progress,
            format!("Parsing file: {}", input.display()),
        )
        .with_subject(input.display().to_string()),
    );
    let identifiers = streams::read_identifiers(input, config.input.gzipped)?;

    Resolver::new(sink)
        .resolve_in_store(config.strategy, store, relation, &identifiers)
        .await
}
