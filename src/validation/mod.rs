/// Pre-flight validation of the catalog and the input/output locations
///
/// Checks run in a fixed order and stop at the first failure. A passing
/// run hands back the opened store together with a `ValidatedRelation`,
/// the only way for the resolver to learn which relation to query.
use crate::db::catalog::RelationSchema;
use crate::db::CatalogStore;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why validation stopped
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("SQLite database {} not found or not usable: {reason}", path.display())]
    StorageNotFound { path: PathBuf, reason: String },

    #[error("Table {table} not found in {}", storage.display())]
    RelationNotFound { storage: PathBuf, table: String },

    #[error("Field {field} not found in table {table}")]
    FieldNotFound { table: String, field: String },

    #[error("Source {tag} not found in table {table} in column {field}")]
    TagNotFound {
        table: String,
        field: String,
        tag: String,
    },

    #[error("Input file {} is not readable: {reason}", path.display())]
    InputUnreadable { path: PathBuf, reason: String },

    #[error("Output location {} is not writable: {reason}", path.display())]
    OutputUnwritable { path: PathBuf, reason: String },
}

/// Everything the validator needs to know
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub storage: PathBuf,
    pub schema: RelationSchema,
    pub target_tag: String,
    pub input: PathBuf,
    /// `None` means stdout
    pub output: Option<PathBuf>,
    pub discarded: PathBuf,
}

/// A relation whose table, columns and target tag were confirmed to exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRelation {
    schema: RelationSchema,
    target_tag: String,
}

impl ValidatedRelation {
    pub fn schema(&self) -> &RelationSchema {
        &self.schema
    }

    pub fn target_tag(&self) -> &str {
        &self.target_tag
    }
}

/// Validates a conversion request
pub struct Validator<'a> {
    sink: &'a dyn DiagnosticSink,
}

impl<'a> Validator<'a> {
    pub fn new(sink: &'a dyn DiagnosticSink) -> Self {
        Self { sink }
    }

    /// Run every check in order
    ///
    /// On success the caller owns the open store and must close it. On
    /// failure the store has already been closed.
    pub async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<(CatalogStore, ValidatedRelation), ValidationError> {
        let mut store = self.open_storage(&request.storage).await?;

        match self.check_catalog(&mut store, request).await {
            Ok(relation) => {
                if let Err(e) = self.check_paths(request) {
                    let _ = store.close().await;
                    return Err(e);
                }
                self.sink.emit(Diagnostic::new(
                    Severity::Info,
                    DiagnosticKind::ValidationCheck,
                    "Validation finished, proceeding with conversion",
                ));
                Ok((store, relation))
            }
            Err(e) => {
                let _ = store.close().await;
                Err(e)
            }
        }
    }

    async fn open_storage(&self, path: &Path) -> Result<CatalogStore, ValidationError> {
        let subject = path.display().to_string();
        if !path.is_file() {
            return Err(self.fail(
                &subject,
                ValidationError::StorageNotFound {
                    path: path.to_path_buf(),
                    reason: "no such file. Perhaps a typo or incorrect path?".to_string(),
                },
            ));
        }

        match CatalogStore::open(path).await {
            Ok(store) => {
                self.pass(&subject, format!("Database {} found", subject));
                Ok(store)
            }
            Err(e) => Err(self.fail(
                &subject,
                ValidationError::StorageNotFound {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                },
            )),
        }
    }

    async fn check_catalog(
        &self,
        store: &mut CatalogStore,
        request: &ValidationRequest,
    ) -> Result<ValidatedRelation, ValidationError> {
        let schema = &request.schema;

        let tables = store
            .tables()
            .await
            .map_err(|e| self.store_failure(&schema.table, &request.storage, e))?;
        if !tables.iter().any(|t| t == &schema.table) {
            return Err(self.fail(
                &schema.table,
                ValidationError::RelationNotFound {
                    storage: request.storage.clone(),
                    table: schema.table.clone(),
                },
            ));
        }
        self.pass(&schema.table, format!("Table {} found", schema.table));

        let columns = store
            .columns(&schema.table)
            .await
            .map_err(|e| self.store_failure(&schema.table, &request.storage, e))?;
        // lookup field first so its failure is reported ahead of the others
        for field in [&schema.tag_column, &schema.id_column, &schema.key_column] {
            if !columns.iter().any(|c| c == field) {
                return Err(self.fail(
                    field,
                    ValidationError::FieldNotFound {
                        table: schema.table.clone(),
                        field: field.clone(),
                    },
                ));
            }
            self.pass(field, format!("Field {} found", field));
        }

        let tag_found = store
            .has_value(&schema.table, &schema.tag_column, &request.target_tag)
            .await
            .map_err(|e| self.store_failure(&request.target_tag, &request.storage, e))?;
        if !tag_found {
            return Err(self.fail(
                &request.target_tag,
                ValidationError::TagNotFound {
                    table: schema.table.clone(),
                    field: schema.tag_column.clone(),
                    tag: request.target_tag.clone(),
                },
            ));
        }
        self.pass(
            &request.target_tag,
            format!("Source {} found", request.target_tag),
        );

        Ok(ValidatedRelation {
            schema: schema.clone(),
            target_tag: request.target_tag.clone(),
        })
    }

    fn check_paths(&self, request: &ValidationRequest) -> Result<(), ValidationError> {
        let input = request.input.display().to_string();
        if let Err(reason) = check_readable(&request.input) {
            return Err(self.fail(
                &input,
                ValidationError::InputUnreadable {
                    path: request.input.clone(),
                    reason,
                },
            ));
        }
        self.pass(&input, format!("Input file {} found", input));

        let outputs = request.output.iter().chain(std::iter::once(&request.discarded));
        for path in outputs {
            let subject = path.display().to_string();
            if let Err(reason) = check_writable(path) {
                return Err(self.fail(
                    &subject,
                    ValidationError::OutputUnwritable {
                        path: path.clone(),
                        reason,
                    },
                ));
            }
            self.pass(&subject, format!("Output file {} can be created", subject));
        }

        Ok(())
    }

    fn pass(&self, subject: &str, message: impl Into<String>) {
        self.sink.emit(
            Diagnostic::new(Severity::Info, DiagnosticKind::ValidationCheck, message)
                .with_subject(subject),
        );
    }

    fn fail(&self, subject: &str, error: ValidationError) -> ValidationError {
        self.sink.emit(
            Diagnostic::new(
                Severity::Critical,
                DiagnosticKind::ValidationFailure,
                error.to_string(),
            )
            .with_subject(subject),
        );
        error
    }

    /// A catalog that stops answering mid-validation is reported as unusable
    fn store_failure(&self, subject: &str, storage: &Path, e: sqlx::Error) -> ValidationError {
        self.fail(
            subject,
            ValidationError::StorageNotFound {
                path: storage.to_path_buf(),
                reason: e.to_string(),
            },
        )
    }
}

fn check_readable(path: &Path) -> Result<(), String> {
    if path.is_dir() {
        return Err("is a directory".to_string());
    }
    File::open(path)
        .map(|_| ())
        .map_err(|e| format!("{}. Check typos or correct the path", e))
}

/// Open `path` for appending, removing it again if it did not exist
fn check_writable(path: &Path) -> Result<(), String> {
    if path.is_dir() {
        return Err("is a directory, expected a file path".to_string());
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match parent.metadata() {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(format!("{} is not a directory", parent.display()));
        }
        Ok(_) => {}
        Err(e) => return Err(format!("folder {} not found: {}", parent.display(), e)),
    }

    let existed = path.exists();
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("cannot open for writing: {}", e))?;
    if !existed {
        fs::remove_file(path).map_err(|e| format!("cannot remove {}: {}", path.display(), e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::scenario_catalog;
    use crate::diagnostics::MemorySink;
    use tempfile::tempdir;

    fn request(dir: &Path, storage: PathBuf) -> ValidationRequest {
        let input = dir.join("input.txt");
        std::fs::write(&input, "C001\n").unwrap();
        ValidationRequest {
            storage,
            schema: RelationSchema {
                table: "mbroleplus".to_string(),
                id_column: "id".to_string(),
                key_column: "inchikey".to_string(),
                tag_column: "database".to_string(),
            },
            target_tag: "HMDB".to_string(),
            input,
            output: Some(dir.join("output.txt")),
            discarded: dir.join("discarded.txt"),
        }
    }

    #[tokio::test]
    async fn test_valid_request_passes() {
        let dir = tempdir().unwrap();
        let storage = scenario_catalog(dir.path()).await;
        let sink = MemorySink::default();

        let (store, relation) = Validator::new(&sink)
            .validate(&request(dir.path(), storage))
            .await
            .unwrap();
        store.close().await.unwrap();

        assert_eq!(relation.target_tag(), "HMDB");
        assert_eq!(relation.schema().table, "mbroleplus");
        assert!(sink.of_kind(DiagnosticKind::ValidationFailure).is_empty());
        // storage, table, three fields, tag, input, output, discarded, finished
        assert_eq!(sink.of_kind(DiagnosticKind::ValidationCheck).len(), 10);
    }

    #[tokio::test]
    async fn test_missing_storage() {
        let dir = tempdir().unwrap();
        let sink = MemorySink::default();
        let req = request(dir.path(), dir.path().join("nope.sqlite"));

        let err = Validator::new(&sink).validate(&req).await.unwrap_err();
        assert!(matches!(err, ValidationError::StorageNotFound { .. }));

        let failures = sink.of_kind(DiagnosticKind::ValidationFailure);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let dir = tempdir().unwrap();
        let storage = scenario_catalog(dir.path()).await;
        let sink = MemorySink::default();
        let mut req = request(dir.path(), storage);
        req.schema.table = "compounds".to_string();

        let err = Validator::new(&sink).validate(&req).await.unwrap_err();
        assert!(matches!(
            err,
            ValidationError::RelationNotFound { ref table, .. } if table == "compounds"
        ));
    }

    #[tokio::test]
    async fn test_missing_field() {
        let dir = tempdir().unwrap();
        let storage = scenario_catalog(dir.path()).await;
        let sink = MemorySink::default();
        let mut req = request(dir.path(), storage);
        req.schema.tag_column = "source".to_string();

        let err = Validator::new(&sink).validate(&req).await.unwrap_err();
        assert!(matches!(
            err,
            ValidationError::FieldNotFound { ref field, .. } if field == "source"
        ));
    }

    #[tokio::test]
    async fn test_missing_key_column() {
        let dir = tempdir().unwrap();
        let storage = scenario_catalog(dir.path()).await;
        let sink = MemorySink::default();
        let mut req = request(dir.path(), storage);
        req.schema.key_column = "inchi".to_string();

        let err = Validator::new(&sink).validate(&req).await.unwrap_err();
        assert!(matches!(
            err,
            ValidationError::FieldNotFound { ref field, .. } if field == "inchi"
        ));
    }

    #[tokio::test]
    async fn test_missing_tag() {
        let dir = tempdir().unwrap();
        let storage = scenario_catalog(dir.path()).await;
        let sink = MemorySink::default();
        let mut req = request(dir.path(), storage);
        req.target_tag = "ChEBI".to_string();

        let err = Validator::new(&sink).validate(&req).await.unwrap_err();
        assert!(matches!(err, ValidationError::TagNotFound { ref tag, .. } if tag == "ChEBI"));
    }

    #[tokio::test]
    async fn test_unreadable_input() {
        let dir = tempdir().unwrap();
        let storage = scenario_catalog(dir.path()).await;
        let sink = MemorySink::default();
        let mut req = request(dir.path(), storage);
        req.input = dir.path().join("missing.txt");

        let err = Validator::new(&sink).validate(&req).await.unwrap_err();
        assert!(matches!(err, ValidationError::InputUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_unwritable_output_folder() {
        let dir = tempdir().unwrap();
        let storage = scenario_catalog(dir.path()).await;
        let sink = MemorySink::default();
        let mut req = request(dir.path(), storage);
        req.output = Some(dir.path().join("no").join("such").join("out.txt"));

        let err = Validator::new(&sink).validate(&req).await.unwrap_err();
        assert!(matches!(err, ValidationError::OutputUnwritable { .. }));
    }

    #[tokio::test]
    async fn test_discarded_directory_is_rejected() {
        let dir = tempdir().unwrap();
        let storage = scenario_catalog(dir.path()).await;
        let sink = MemorySink::default();
        let mut req = request(dir.path(), storage);
        req.output = None;
        req.discarded = dir.path().to_path_buf();

        let err = Validator::new(&sink).validate(&req).await.unwrap_err();
        assert!(matches!(err, ValidationError::OutputUnwritable { .. }));
    }

    #[tokio::test]
    async fn test_checks_stop_at_first_failure() {
        let dir = tempdir().unwrap();
        let storage = scenario_catalog(dir.path()).await;
        let sink = MemorySink::default();
        let mut req = request(dir.path(), storage);
        req.schema.table = "compounds".to_string();
        req.input = dir.path().join("missing.txt");

        let err = Validator::new(&sink).validate(&req).await.unwrap_err();
        assert!(matches!(err, ValidationError::RelationNotFound { .. }));
        assert_eq!(sink.of_kind(DiagnosticKind::ValidationFailure).len(), 1);
        // only the storage check passed
        assert_eq!(sink.of_kind(DiagnosticKind::ValidationCheck).len(), 1);
    }

    #[test]
    fn test_store_failure_is_reported_as_critical() {
        let sink = MemorySink::default();
        let err = Validator::new(&sink).store_failure(
            "mbroleplus",
            Path::new("catalog.sqlite"),
            sqlx::Error::PoolClosed,
        );

        assert!(matches!(err, ValidationError::StorageNotFound { .. }));
        let failures = sink.of_kind(DiagnosticKind::ValidationFailure);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].severity, Severity::Critical);
        assert_eq!(failures[0].subject.as_deref(), Some("mbroleplus"));
    }

    #[test]
    fn test_writable_check_leaves_no_file_behind() {
        let dir = tempdir().unwrap();
        let fresh = dir.path().join("fresh.txt");
        check_writable(&fresh).unwrap();
        assert!(!fresh.exists());

        let existing = dir.path().join("existing.txt");
        std::fs::write(&existing, "keep me\n").unwrap();
        check_writable(&existing).unwrap();
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "keep me\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_folder_without_write_permission_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let storage = scenario_catalog(dir.path()).await;
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

        // permission bits do not bind privileged users
        let bypassed = File::create(locked.join("canary")).is_ok();
        if !bypassed {
            let sink = MemorySink::default();
            let mut req = request(dir.path(), storage);
            req.output = Some(locked.join("out.txt"));

            let err = Validator::new(&sink).validate(&req).await.unwrap_err();
            assert!(matches!(err, ValidationError::OutputUnwritable { .. }));
            assert!(!locked.join("out.txt").exists());
        }

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
