/// Database layer for the converter
///
/// Opens the conversion catalog read-only and provides typed access to
/// the identifier / InChIKey / catalog relation.

pub mod catalog;

pub use catalog::{CatalogStore, CompoundRecord};

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::path::Path;
use std::time::Duration;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub busy_timeout: Duration,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Open a read-only connection to an existing SQLite database
pub async fn open_read_only(
    path: &Path,
    options: DatabaseOptions,
) -> Result<SqliteConnection, sqlx::Error> {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false)
        .busy_timeout(options.busy_timeout)
        .connect()
        .await?;

    if let Err(e) = test_connection(&mut conn).await {
        let _ = conn.close().await;
        return Err(e);
    }

    Ok(conn)
}

/// Test database connection
///
/// Touches `sqlite_master` so that a file which is not a database fails
/// here rather than on the first real query.
pub async fn test_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT count(*) FROM sqlite_master")
        .fetch_one(&mut *conn)
        .await?;

    Ok(())
}

/// Quote an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
