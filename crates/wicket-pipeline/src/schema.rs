use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use rusqlite::{Connection, OpenFlags};

use crate::error::PipelineError;

pub type SchemaFuture<'a> = Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send + 'a>>;

/// Supplies the table definitions the generator shows the model.
pub trait SchemaSource: Send + Sync {
    fn schema(&self) -> SchemaFuture<'_>;
}

/// Reads `CREATE TABLE` statements from a SQLite database, opened read-only.
#[derive(Debug, Clone)]
pub struct SqliteSchemaSource {
    path: PathBuf,
}

impl SqliteSchemaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SchemaSource for SqliteSchemaSource {
    fn schema(&self) -> SchemaFuture<'_> {
        Box::pin(async move {
            let path = self.path.clone();
            // rusqlite is blocking
            tokio::task::spawn_blocking(move || read_schema(&path))
                .await
                .map_err(|e| PipelineError::SchemaUnavailable(format!("task join error: {e}")))?
        })
    }
}

fn read_schema(path: &Path) -> Result<String, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::SchemaUnavailable(format!(
            "database file not found at '{}'",
            path.display()
        )));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut stmt = conn.prepare(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let parts = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    if parts.is_empty() {
        return Err(PipelineError::SchemaUnavailable(format!(
            "no tables found in '{}'",
            path.display()
        )));
    }

    tracing::debug!(path = %path.display(), tables = parts.len(), "Database schema read");
    Ok(parts.join("\n\n"))
}

/// A fixed schema string, for tests and for deployments without a database.
#[derive(Debug, Clone)]
pub struct StaticSchemaSource(pub String);

impl SchemaSource for StaticSchemaSource {
    fn schema(&self) -> SchemaFuture<'_> {
        let schema = self.0.clone();
        Box::pin(async move { Ok(schema) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded_db(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("widgets.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE members (id INTEGER PRIMARY KEY, name TEXT, tier TEXT);
             CREATE TABLE sales (id INTEGER PRIMARY KEY AUTOINCREMENT, member_id INTEGER, amount REAL);",
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn reads_create_statements() {
        let dir = TempDir::new().unwrap();
        let source = SqliteSchemaSource::new(seeded_db(&dir));

        let schema = source.schema().await.unwrap();
        assert!(schema.contains("CREATE TABLE members"));
        assert!(schema.contains("CREATE TABLE sales"));
        assert!(schema.contains("\n\n"));
        // AUTOINCREMENT creates sqlite_sequence, which is not user data
        assert!(!schema.contains("sqlite_sequence"));
    }

    #[tokio::test]
    async fn missing_database_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let source = SqliteSchemaSource::new(dir.path().join("absent.db"));

        let err = source.schema().await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaUnavailable(m) if m.contains("absent.db")));
        assert!(!dir.path().join("absent.db").exists());
    }

    #[tokio::test]
    async fn empty_database_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("PRAGMA user_version = 1;")
            .unwrap();

        let err = SqliteSchemaSource::new(path).schema().await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaUnavailable(m) if m.contains("no tables")));
    }

    #[tokio::test]
    async fn garbage_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, b"definitely not sqlite, just some bytes padding it out").unwrap();

        let err = SqliteSchemaSource::new(path).schema().await.unwrap_err();
        assert!(matches!(err, PipelineError::SchemaUnavailable(_)));
    }

    #[tokio::test]
    async fn static_source_returns_its_text() {
        let source = StaticSchemaSource("CREATE TABLE t (x INT)".into());
        assert_eq!(source.schema().await.unwrap(), "CREATE TABLE t (x INT)");
    }
}
