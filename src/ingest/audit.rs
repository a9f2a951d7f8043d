//! Import batch audit trail.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::Db;
use crate::error::Result;

/// What is known about an import attempt before it commits or fails.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    pub source_name: Option<String>,
    pub payload_sha256: String,
    pub rows_read: usize,
}

/// One row of `import_batches`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatchRow {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    pub source_name: Option<String>,
    pub payload_sha256: String,
    pub rows_read: usize,
    pub inserted: usize,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Write an audit row on an open connection or transaction.
///
/// `error_message` of `None` marks the batch successful.
pub(crate) fn insert_record(
    conn: &Connection,
    record: &ImportRecord,
    inserted: usize,
    error_message: Option<&str>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO import_batches (
            batch_id, started_at, source_name, payload_sha256,
            rows_read, inserted, success, error_message
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            record.batch_id,
            record.started_at.to_rfc3339(),
            record.source_name,
            record.payload_sha256,
            record.rows_read as i64,
            inserted as i64,
            error_message.is_none(),
            error_message,
        ],
    )?;
    Ok(())
}

/// Record an import that never committed.
pub async fn record_failed_import(db: &Db, record: ImportRecord, error_message: String) -> Result<()> {
    db.with_connection(move |conn| insert_record(conn, &record, 0, Some(&error_message)))
        .await
}

/// Most recent import attempts first.
pub async fn list_imports(db: &Db, limit: usize) -> Result<Vec<ImportBatchRow>> {
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT batch_id, started_at, source_name, payload_sha256,
                   rows_read, inserted, success, error_message
            FROM import_batches
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ImportBatchRow {
                batch_id: row.get(0)?,
                started_at: row.get(1)?,
                source_name: row.get(2)?,
                payload_sha256: row.get(3)?,
                rows_read: row.get::<_, i64>(4)? as usize,
                inserted: row.get::<_, i64>(5)? as usize,
                success: row.get(6)?,
                error_message: row.get(7)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use chrono::Duration;
    use std::path::Path;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_failed_imports_listed_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();

        let started = Utc::now();
        for (i, name) in ["old.csv", "new.csv"].iter().enumerate() {
            let record = ImportRecord {
                batch_id: format!("batch-{}", i),
                started_at: started + Duration::seconds(i as i64),
                source_name: Some(name.to_string()),
                payload_sha256: "ab".to_string(),
                rows_read: 3,
            };
            record_failed_import(&db, record, "Validation failed: 1 issue(s)".to_string())
                .await
                .unwrap();
        }

        let rows = list_imports(&db, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source_name.as_deref(), Some("new.csv"));
        assert!(!rows[0].success);
        assert_eq!(rows[0].inserted, 0);
        assert_eq!(rows[0].rows_read, 3);
        assert!(rows[0].error_message.as_deref().unwrap().contains("Validation"));

        assert_eq!(list_imports(&db, 1).await.unwrap().len(), 1);
    }
}
