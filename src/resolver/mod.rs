/// Identifier resolution through shared InChIKeys
///
/// Every distinct input identifier goes through two hops:
/// identifier -> canonical key, then canonical key -> identifiers listed
/// under the target catalog. The outcome is a total partition of the input
/// into matched and unmatched identifiers.

pub mod index;

pub use index::CompoundIndex;

use crate::config::ResolutionStrategy;
use crate::db::CatalogStore;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
use crate::error::{ConverterError, ConverterResult};
use crate::validation::ValidatedRelation;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// Canonical key chosen for an identifier at hop 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    pub canonical_key: String,
    /// Every distinct key the identifier was seen with
    pub candidates: BTreeSet<String>,
}

impl SourceKey {
    pub fn is_ambiguous(&self) -> bool {
        self.candidates.len() > 1
    }
}

/// The two lookups the resolver needs
///
/// When an identifier has rows with different keys, `source_key` must pick
/// the key of the row with the smallest `(source_tag, canonical_key)` pair.
#[async_trait]
pub trait CompoundLookup: Send {
    /// Hop 1, `None` when the identifier has no row at all
    async fn source_key(&mut self, identifier: &str) -> Result<Option<SourceKey>, sqlx::Error>;

    /// Hop 2, identifiers under the target catalog sharing `canonical_key`
    async fn targets(&mut self, canonical_key: &str) -> Result<BTreeSet<String>, sqlx::Error>;
}

/// [`CompoundLookup`] issuing two queries per identifier
pub struct PointLookup<'a> {
    store: &'a mut CatalogStore,
    relation: &'a ValidatedRelation,
}

impl<'a> PointLookup<'a> {
    pub fn new(store: &'a mut CatalogStore, relation: &'a ValidatedRelation) -> Self {
        Self { store, relation }
    }
}

#[async_trait]
impl CompoundLookup for PointLookup<'_> {
    async fn source_key(&mut self, identifier: &str) -> Result<Option<SourceKey>, sqlx::Error> {
        let rows = self.store.key_rows(self.relation.schema(), identifier).await?;
        let Some(first) = rows.first() else {
            return Ok(None);
        };

        Ok(Some(SourceKey {
            canonical_key: first.canonical_key.clone(),
            candidates: rows.iter().map(|r| r.canonical_key.clone()).collect(),
        }))
    }

    async fn targets(&mut self, canonical_key: &str) -> Result<BTreeSet<String>, sqlx::Error> {
        self.store
            .identifiers_for_key(
                self.relation.schema(),
                canonical_key,
                self.relation.target_tag(),
            )
            .await
    }
}

/// Why an identifier could not be converted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// No row carries the identifier
    NoSourceRow,
    /// The key exists but the target catalog does not list it
    NoTargetRow { canonical_key: String },
}

/// Result of resolving one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Matched(BTreeSet<String>),
    Unmatched(MissReason),
}

/// Matched / unmatched partition of the input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    matched: BTreeMap<String, BTreeSet<String>>,
    unmatched: BTreeSet<String>,
}

impl Resolution {
    fn record(&mut self, identifier: &str, outcome: Outcome) {
        match outcome {
            Outcome::Matched(targets) => {
                self.matched.insert(identifier.to_string(), targets);
            }
            Outcome::Unmatched(_) => {
                self.unmatched.insert(identifier.to_string());
            }
        }
    }

    /// Identifier to its non-empty set of target identifiers
    pub fn matched(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.matched
    }

    pub fn unmatched(&self) -> &BTreeSet<String> {
        &self.unmatched
    }

    /// Distinct union of all target identifiers
    pub fn targets(&self) -> BTreeSet<&str> {
        self.matched
            .values()
            .flat_map(|targets| targets.iter().map(String::as_str))
            .collect()
    }

    pub fn summary(&self) -> ResolutionSummary {
        let matched = self.matched.len();
        let unmatched = self.unmatched.len();
        let total = matched + unmatched;
        let matched_fraction = if total == 0 {
            0.0
        } else {
            matched as f64 / total as f64
        };

        ResolutionSummary {
            total,
            matched,
            unmatched,
            matched_fraction,
        }
    }
}

/// End-of-run counts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// In `[0, 1]`; zero for an empty input
    pub matched_fraction: f64,
}

/// Resolves identifiers against a validated relation
pub struct Resolver<'a> {
    sink: &'a dyn DiagnosticSink,
}

impl<'a> Resolver<'a> {
    pub fn new(sink: &'a dyn DiagnosticSink) -> Self {
        Self { sink }
    }

    /// Resolve with the configured lookup strategy
    pub async fn resolve_in_store(
        &self,
        strategy: ResolutionStrategy,
        store: &mut CatalogStore,
        relation: &ValidatedRelation,
        identifiers: &BTreeSet<String>,
    ) -> ConverterResult<Resolution> {
        match strategy {
            ResolutionStrategy::Indexed => {
                let records = store
                    .scan(relation.schema())
                    .await
                    .map_err(ConverterError::Lookup)?;
                let index = CompoundIndex::build(records);
                tracing::debug!(
                    rows = index.rows(),
                    identifiers = index.identifiers(),
                    "Built compound index"
                );
                self.resolve(&mut index.lookup(relation.target_tag()), identifiers)
                    .await
            }
            ResolutionStrategy::Point => {
                self.resolve(&mut PointLookup::new(store, relation), identifiers)
                    .await
            }
        }
    }

    /// Resolve every identifier
    ///
    /// A lookup failure aborts the whole run; no partial result is returned.
    pub async fn resolve(
        &self,
        lookup: &mut dyn CompoundLookup,
        identifiers: &BTreeSet<String>,
    ) -> ConverterResult<Resolution> {
        self.sink.emit(Diagnostic::new(
            Severity::Info,
            DiagnosticKind::Progress,
            format!("Querying {} metabolites", identifiers.len()),
        ));

        let mut resolution = Resolution::default();
        for (done, identifier) in identifiers.iter().enumerate() {
            let outcome = self
                .resolve_one(lookup, identifier)
                .await
                .map_err(ConverterError::Lookup)?;
            resolution.record(identifier, outcome);

            self.sink.emit(
                Diagnostic::new(
                    Severity::Debug,
                    DiagnosticKind::Progress,
                    format!("{}/{} processed", done + 1, identifiers.len()),
                )
                .with_subject(identifier.as_str()),
            );
        }

        self.report(&resolution.summary());
        Ok(resolution)
    }

    /// Resolve a single identifier
    pub async fn resolve_one(
        &self,
        lookup: &mut dyn CompoundLookup,
        identifier: &str,
    ) -> Result<Outcome, sqlx::Error> {
        let Some(source) = lookup.source_key(identifier).await? else {
            self.sink.emit(
                Diagnostic::new(
                    Severity::Warning,
                    DiagnosticKind::LookupMiss,
                    format!("Metabolite with ID {} not found", identifier),
                )
                .with_subject(identifier),
            );
            return Ok(Outcome::Unmatched(MissReason::NoSourceRow));
        };

        if source.is_ambiguous() {
            let candidates: Vec<&str> = source.candidates.iter().map(String::as_str).collect();
            self.sink.emit(
                Diagnostic::new(
                    Severity::Warning,
                    DiagnosticKind::AmbiguousSource,
                    format!(
                        "ID {} maps to {} inchikeys ({}); using {}",
                        identifier,
                        candidates.len(),
                        candidates.join(", "),
                        source.canonical_key
                    ),
                )
                .with_subject(identifier),
            );
        }
        self.sink.emit(
            Diagnostic::new(
                Severity::Debug,
                DiagnosticKind::Progress,
                format!("Found inchikey {} with ID {}", source.canonical_key, identifier),
            )
            .with_subject(identifier),
        );

        let targets = lookup.targets(&source.canonical_key).await?;
        if targets.is_empty() {
            self.sink.emit(
                Diagnostic::new(
                    Severity::Warning,
                    DiagnosticKind::LookupMiss,
                    format!(
                        "Metabolite with ID {} has inchikey {} but no entry in the target database",
                        identifier, source.canonical_key
                    ),
                )
                .with_subject(identifier),
            );
            return Ok(Outcome::Unmatched(MissReason::NoTargetRow {
                canonical_key: source.canonical_key,
            }));
        }

        Ok(Outcome::Matched(targets))
    }

    fn report(&self, summary: &ResolutionSummary) {
        self.sink.emit(Diagnostic::new(
            Severity::Info,
            DiagnosticKind::Summary,
            format!(
                "Found {} IDs ({:.2}%)",
                summary.matched,
                summary.matched_fraction * 100.0
            ),
        ));
        self.sink.emit(Diagnostic::new(
            Severity::Info,
            DiagnosticKind::Summary,
            format!(
                "{} metabolites not found ({:.2}%)",
                summary.unmatched,
                if summary.total == 0 {
                    0.0
                } else {
                    (1.0 - summary.matched_fraction) * 100.0
                }
            ),
        ));
    }
}
