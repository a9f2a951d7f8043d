pub mod audit;
pub mod db_writer;
pub mod format;
pub mod reader;
pub mod validate;

pub use audit::{list_imports, ImportBatchRow, ImportRecord};
pub use db_writer::{commit_batch, load_snapshot};
pub use format::DelimitedFormat;
pub use reader::{normalize_header, read_drafts, DraftRows};
pub use validate::{
    validate_batch, CandidateRow, Issue, IssueKind, StoreSnapshot, ValidatedBatch,
    ValidationPolicy, ValidationReport,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::db::Db;
use crate::error::{Result, RosterError};

/// An uploaded file as received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Result of a committed import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub batch_id: String,
    pub rows_read: usize,
    pub inserted: usize,
    pub duplicates_resolved: usize,
    /// Rows left out in `valid_subset` mode.
    pub skipped: Vec<Issue>,
    pub generation: i64,
}

/// Runs uploads through parse, validate and commit, and audits every attempt.
pub struct Importer {
    db: Db,
    config: IngestConfig,
}

impl Importer {
    pub fn new(db: Db, config: IngestConfig) -> Self {
        Self { db, config }
    }

    pub async fn import(&self, upload: Upload) -> Result<ImportSummary> {
        let mut record = ImportRecord {
            batch_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            source_name: upload.file_name.clone(),
            payload_sha256: payload_digest(&upload.bytes),
            rows_read: 0,
        };

        log::info!(
            "Import {} started: {} ({} bytes)",
            record.batch_id,
            record.source_name.as_deref().unwrap_or("<unnamed>"),
            upload.bytes.len()
        );

        let result = self.run(&upload, &mut record).await;
        self.finish(record, result).await
    }

    /// Audit a failed attempt; successful ones are audited inside the commit.
    async fn finish(
        &self,
        record: ImportRecord,
        result: Result<ImportSummary>,
    ) -> Result<ImportSummary> {
        let e = match result {
            Ok(summary) => return Ok(summary),
            Err(e) => e,
        };

        log::warn!("Import {} failed: {}", record.batch_id, e);
        let batch_id = record.batch_id.clone();
        if let Err(audit_err) = audit::record_failed_import(&self.db, record, e.to_string()).await {
            log::warn!("Failed to record audit row for import {}: {}", batch_id, audit_err);
        }
        Err(e)
    }

    async fn run(&self, upload: &Upload, record: &mut ImportRecord) -> Result<ImportSummary> {
        let format = DelimitedFormat::detect(
            upload.content_type.as_deref(),
            upload.file_name.as_deref(),
        )
        .ok_or_else(|| {
            RosterError::UnsupportedUpload(format!(
                "expected a CSV or TSV file, got content type `{}`",
                upload.content_type.as_deref().unwrap_or("none")
            ))
        })?;

        if upload.bytes.is_empty() {
            return Err(RosterError::UnsupportedUpload("uploaded file is empty".to_string()));
        }

        let (rows, row_issues) = prepare_rows(&upload.bytes, format, record.started_at)?;
        record.rows_read = rows.len() + row_issues.len();
        log::debug!(
            "Import {}: {} rows read, {} failed coercion",
            record.batch_id,
            record.rows_read,
            row_issues.len()
        );

        if record.rows_read == 0 {
            return Err(RosterError::Validation(ValidationReport::single(Issue::batch(
                IssueKind::EmptyBatch,
                "file has a header row but no data rows",
            ))));
        }

        let snapshot = load_snapshot(&self.db).await?;
        self.commit_with_retry(&rows, &row_issues, record, snapshot).await
    }

    /// Validate against `snapshot` and commit; on a generation conflict,
    /// re-snapshot and revalidate up to `conflict_retries` times.
    async fn commit_with_retry(
        &self,
        rows: &[CandidateRow],
        row_issues: &[Issue],
        record: &ImportRecord,
        mut snapshot: StoreSnapshot,
    ) -> Result<ImportSummary> {
        let policy = ValidationPolicy::from(&self.config);
        let mut attempt = 0;

        loop {
            let ValidatedBatch {
                employees,
                skipped,
                duplicates_resolved,
            } = validate_batch(rows, row_issues, &snapshot, &policy)?;
            let inserted = employees.len();

            match commit_batch(&self.db, employees, snapshot.generation, record.clone()).await {
                Ok(generation) => {
                    log::info!(
                        "Import {} committed: {} inserted, {} skipped, generation {}",
                        record.batch_id,
                        inserted,
                        skipped.len(),
                        generation
                    );
                    return Ok(ImportSummary {
                        batch_id: record.batch_id.clone(),
                        rows_read: record.rows_read,
                        inserted,
                        duplicates_resolved,
                        skipped,
                        generation,
                    });
                }
                Err(RosterError::Conflict(reason)) if attempt < self.config.conflict_retries => {
                    attempt += 1;
                    log::warn!(
                        "Import {}: {}; revalidating ({}/{})",
                        record.batch_id,
                        reason,
                        attempt,
                        self.config.conflict_retries
                    );
                    snapshot = load_snapshot(&self.db).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Parse every row; schema failures become issues rather than errors.
///
/// Structural problems (ragged rows, bad quoting, invalid UTF-8) abort with
/// a parse error.
fn prepare_rows(
    bytes: &[u8],
    format: DelimitedFormat,
    now: DateTime<Utc>,
) -> Result<(Vec<CandidateRow>, Vec<Issue>)> {
    let mut rows = Vec::new();
    let mut issues = Vec::new();

    for item in read_drafts(bytes, format)? {
        let (line, draft) = item?;
        let id = draft.parsed_id();
        match draft.into_employee(now) {
            Ok(employee) => rows.push(CandidateRow { line, employee }),
            Err(err) => issues.push(Issue::row(line, id, IssueKind::InvalidField, err.to_string())),
        }
    }

    Ok((rows, issues))
}

fn payload_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommitMode;
    use crate::db::{employees, migrate};
    use crate::model::EmployeeId;
    use std::path::Path;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        (db, temp_dir)
    }

    fn csv_upload(body: &str) -> Upload {
        Upload {
            file_name: Some("staff.csv".to_string()),
            content_type: Some("text/csv".to_string()),
            bytes: body.as_bytes().to_vec(),
        }
    }

    async fn stored_count(db: &Db) -> usize {
        db.with_connection(|conn| employees::count(conn)).await.unwrap()
    }

    #[tokio::test]
    async fn test_import_commits_batch() {
        let (db, _temp) = setup_test_db().await;
        let importer = Importer::new(db.clone(), IngestConfig::default());

        let summary = importer
            .import(csv_upload(
                "id,name,username,email,managedBy\n\
                 2,Bob,bob,bob@example.com,1\n\
                 1,Alice,alice,alice@example.com,\n\
                 3,Carol,carol,,1\n",
            ))
            .await
            .unwrap();

        assert_eq!(summary.rows_read, 3);
        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.generation, 1);
        assert!(summary.skipped.is_empty());
        assert_eq!(stored_count(&db).await, 3);

        let imports = list_imports(&db, 5).await.unwrap();
        assert_eq!(imports[0].batch_id, summary.batch_id);
        assert!(imports[0].success);
        assert_eq!(imports[0].payload_sha256.len(), 64);
    }

    #[tokio::test]
    async fn test_second_import_can_attach_to_stored_parent() {
        let (db, _temp) = setup_test_db().await;
        let importer = Importer::new(db.clone(), IngestConfig::default());

        importer.import(csv_upload("id,name\n1,Alice\n")).await.unwrap();
        let summary = importer
            .import(csv_upload("id,name,managed_by\n2,Bob,1\n"))
            .await
            .unwrap();

        assert_eq!(summary.generation, 2);
        let bob = db
            .with_connection(|conn| employees::fetch_one(conn, EmployeeId(2)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bob.managed_by, Some(EmployeeId(1)));
    }

    #[tokio::test]
    async fn test_invalid_row_rejects_whole_batch_and_is_audited() {
        let (db, _temp) = setup_test_db().await;
        let importer = Importer::new(db.clone(), IngestConfig::default());

        let err = importer
            .import(csv_upload("id,name,managedBy\n1,Alice,\n2,,1\n3,Carol,9\n"))
            .await
            .unwrap_err();

        match err {
            RosterError::Validation(report) => {
                assert_eq!(report.total, 2);
                assert_eq!(report.issues[0].kind, IssueKind::InvalidField);
                assert_eq!(report.issues[0].line, Some(3));
                assert_eq!(report.issues[1].kind, IssueKind::UnknownParent);
            }
            other => panic!("unexpected error: {}", other),
        }

        assert_eq!(stored_count(&db).await, 0);
        let imports = list_imports(&db, 5).await.unwrap();
        assert_eq!(imports.len(), 1);
        assert!(!imports[0].success);
        assert_eq!(imports[0].rows_read, 3);
    }

    #[tokio::test]
    async fn test_valid_subset_commits_the_rest() {
        let (db, _temp) = setup_test_db().await;
        let config = IngestConfig {
            commit_mode: CommitMode::ValidSubset,
            ..IngestConfig::default()
        };
        let importer = Importer::new(db.clone(), config);

        let summary = importer
            .import(csv_upload("id,name,managedBy\n1,Alice,\n2,,1\n3,Carol,2\n4,Dan,1\n"))
            .await
            .unwrap();

        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped.len(), 2);
        assert_eq!(summary.skipped[1].kind, IssueKind::ParentRejected);
        assert_eq!(stored_count(&db).await, 2);
    }

    #[tokio::test]
    async fn test_header_only_file_is_rejected() {
        let (db, _temp) = setup_test_db().await;
        let importer = Importer::new(db, IngestConfig::default());

        let err = importer.import(csv_upload("id,name\n")).await.unwrap_err();
        match err {
            RosterError::Validation(report) => {
                assert_eq!(report.issues[0].kind, IssueKind::EmptyBatch)
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_content_type() {
        let (db, _temp) = setup_test_db().await;
        let importer = Importer::new(db, IngestConfig::default());

        let upload = Upload {
            file_name: Some("staff.json".to_string()),
            content_type: Some("application/json".to_string()),
            bytes: b"[]".to_vec(),
        };
        let err = importer.import(upload).await.unwrap_err();
        assert!(matches!(err, RosterError::UnsupportedUpload(_)));
    }

    #[tokio::test]
    async fn test_ragged_file_is_parse_error() {
        let (db, _temp) = setup_test_db().await;
        let importer = Importer::new(db.clone(), IngestConfig::default());

        let err = importer
            .import(csv_upload("id,name\n1,Alice\n2\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::Parse { line: 3, .. }));
        assert_eq!(stored_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_imports_both_commit() {
        let (db, _temp) = setup_test_db().await;
        let importer = Importer::new(db.clone(), IngestConfig::default());

        let (a, b) = tokio::join!(
            importer.import(csv_upload("id,name\n1,Alice\n2,Bob\n")),
            importer.import(csv_upload("id,name\n10,Xavier\n11,Yolanda\n")),
        );
        let mut generations = vec![a.unwrap().generation, b.unwrap().generation];
        generations.sort();

        assert_eq!(generations, vec![1, 2]);
        assert_eq!(stored_count(&db).await, 4);
    }

    #[tokio::test]
    async fn test_valid_subset_accounts_for_duplicate_rows() {
        let (db, _temp) = setup_test_db().await;
        let config = IngestConfig {
            commit_mode: CommitMode::ValidSubset,
            ..IngestConfig::default()
        };
        let importer = Importer::new(db.clone(), config);

        let summary = importer
            .import(csv_upload("id,name
1,Ann
1,Ben
2,Cleo
"))
            .await
            .unwrap();

        assert_eq!(summary.rows_read, 3);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped.len(), 2);
        assert_eq!(summary.inserted + summary.skipped.len(), summary.rows_read);
        assert!(summary.skipped.iter().all(|i| i.kind == IssueKind::DuplicateId));
        assert_eq!(stored_count(&db).await, 1);
    }

    fn test_record(rows_read: usize) -> ImportRecord {
        ImportRecord {
            batch_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            source_name: Some("staff.csv".to_string()),
            payload_sha256: payload_digest(b"id,name\n1,Alice\n"),
            rows_read,
        }
    }

    /// Commits made by another writer after `snapshot` was taken.
    async fn advance_generation(db: &Db) {
        db.with_connection(|conn| {
            conn.execute(
                "UPDATE store_meta SET value = value + 1 WHERE key = 'generation'",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_stale_snapshot_without_retries_is_conflict() {
        let (db, _temp) = setup_test_db().await;
        let config = IngestConfig {
            conflict_retries: 0,
            ..IngestConfig::default()
        };
        let importer = Importer::new(db.clone(), config);

        let (rows, row_issues) =
            prepare_rows(b"id,name\n1,Alice\n", DelimitedFormat::Csv, Utc::now()).unwrap();
        let record = test_record(rows.len());
        let snapshot = load_snapshot(&db).await.unwrap();
        advance_generation(&db).await;

        let result = importer
            .commit_with_retry(&rows, &row_issues, &record, snapshot)
            .await;
        let err = importer.finish(record, result).await.unwrap_err();

        assert!(matches!(err, RosterError::Conflict(_)));
        assert_eq!(
            crate::http::error_response(&err).status(),
            axum::http::StatusCode::CONFLICT
        );
        assert_eq!(stored_count(&db).await, 0);

        let imports = list_imports(&db, 5).await.unwrap();
        assert_eq!(imports.len(), 1);
        assert!(!imports[0].success);
        assert!(imports[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("conflict"));
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_revalidated_and_committed() {
        let (db, _temp) = setup_test_db().await;
        let config = IngestConfig {
            conflict_retries: 1,
            ..IngestConfig::default()
        };
        let importer = Importer::new(db.clone(), config);

        let (rows, row_issues) =
            prepare_rows(b"id,name\n1,Alice\n", DelimitedFormat::Csv, Utc::now()).unwrap();
        let record = test_record(rows.len());
        let snapshot = load_snapshot(&db).await.unwrap();
        advance_generation(&db).await;

        let result = importer
            .commit_with_retry(&rows, &row_issues, &record, snapshot)
            .await;
        let summary = importer.finish(record, result).await.unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.generation, 2);
        assert_eq!(stored_count(&db).await, 1);

        let imports = list_imports(&db, 5).await.unwrap();
        assert_eq!(imports.len(), 1);
        assert!(imports[0].success);
    }
}
