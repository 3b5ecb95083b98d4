/// Catalog store - queries against the identifier / InChIKey relation
use super::{open_read_only, quote_ident, DatabaseOptions};
use sqlx::sqlite::SqliteConnection;
use sqlx::{Connection, FromRow};
use std::collections::BTreeSet;
use std::path::Path;

/// One row of the conversion relation
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CompoundRecord {
    pub source_identifier: String,
    pub canonical_key: String,
    pub source_tag: String,
}

/// Names of the relation and its three columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSchema {
    pub table: String,
    pub id_column: String,
    pub key_column: String,
    pub tag_column: String,
}

impl RelationSchema {
    fn quoted(&self) -> (String, String, String, String) {
        (
            quote_ident(&self.table),
            quote_ident(&self.id_column),
            quote_ident(&self.key_column),
            quote_ident(&self.tag_column),
        )
    }
}

/// A `(canonical_key, source_tag)` pair found for an identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, FromRow)]
pub struct KeyRow {
    pub source_tag: String,
    pub canonical_key: String,
}

/// Read-only handle on the conversion catalog
///
/// Owns a single connection for the whole run. Callers must hand it back
/// through [`CatalogStore::close`] on every exit path.
///
/// Cells are always compared as their text rendering, so a numeric column
/// never matches an identifier that only converts to the same number.
#[derive(Debug)]
pub struct CatalogStore {
    conn: SqliteConnection,
}

impl CatalogStore {
    /// Open an existing catalog read-only
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let conn = open_read_only(path, DatabaseOptions::default()).await?;
        Ok(Self { conn })
    }

    /// Release the connection
    pub async fn close(self) -> Result<(), sqlx::Error> {
        self.conn.close().await
    }

    /// Names of all tables in the catalog
    pub async fn tables(&mut self) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&mut self.conn)
            .await
    }

    /// Column names of a table, in declaration order
    pub async fn columns(&mut self, table: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
            .bind(table)
            .fetch_all(&mut self.conn)
            .await
    }

    /// Whether `value` occurs at least once in `column` of `table`
    pub async fn has_value(
        &mut self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE CAST({} AS TEXT) = ?1 LIMIT 1",
            quote_ident(table),
            quote_ident(column)
        );
        let found: Option<i64> = sqlx::query_scalar(&sql)
            .bind(value)
            .fetch_optional(&mut self.conn)
            .await?;

        Ok(found.is_some())
    }

    /// Every complete row of the relation
    ///
    /// Rows with a NULL identifier, key or tag are skipped.
    pub async fn scan(
        &mut self,
        schema: &RelationSchema,
    ) -> Result<Vec<CompoundRecord>, sqlx::Error> {
        let (table, id, key, tag) = schema.quoted();
        let sql = format!(
            r#"
            SELECT CAST({id} AS TEXT) AS source_identifier,
                   CAST({key} AS TEXT) AS canonical_key,
                   CAST({tag} AS TEXT) AS source_tag
            FROM {table}
            WHERE {id} IS NOT NULL AND {key} IS NOT NULL AND {tag} IS NOT NULL
            "#
        );

        sqlx::query_as::<_, CompoundRecord>(&sql)
            .fetch_all(&mut self.conn)
            .await
    }

    /// Hop 1: the `(tag, key)` pairs recorded for an identifier, smallest first
    pub async fn key_rows(
        &mut self,
        schema: &RelationSchema,
        identifier: &str,
    ) -> Result<Vec<KeyRow>, sqlx::Error> {
        let (table, id, key, tag) = schema.quoted();
        let sql = format!(
            r#"
            SELECT DISTINCT CAST({tag} AS TEXT) AS source_tag,
                            CAST({key} AS TEXT) AS canonical_key
            FROM {table}
            WHERE CAST({id} AS TEXT) = ?1 AND {key} IS NOT NULL AND {tag} IS NOT NULL
            ORDER BY 1 COLLATE BINARY, 2 COLLATE BINARY
            "#
        );

        sqlx::query_as::<_, KeyRow>(&sql)
            .bind(identifier)
            .fetch_all(&mut self.conn)
            .await
    }

    /// Hop 2: identifiers listed under `target_tag` for a canonical key
    pub async fn identifiers_for_key(
        &mut self,
        schema: &RelationSchema,
        canonical_key: &str,
        target_tag: &str,
    ) -> Result<BTreeSet<String>, sqlx::Error> {
        let (table, id, key, tag) = schema.quoted();
        let sql = format!(
            r#"
            SELECT DISTINCT CAST({id} AS TEXT)
            FROM {table}
            WHERE CAST({key} AS TEXT) = ?1
              AND CAST({tag} AS TEXT) = ?2
              AND {id} IS NOT NULL
            "#
        );

        let rows: Vec<String> = sqlx::query_scalar(&sql)
            .bind(canonical_key)
            .bind(target_tag)
            .fetch_all(&mut self.conn)
            .await?;

        Ok(rows.into_iter().collect())
    }
}
