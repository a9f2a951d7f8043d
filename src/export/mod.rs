//! CSV export of the stored roster.

use chrono::{DateTime, Utc};

use crate::config::ExportConfig;
use crate::db::{employees, Db};
use crate::error::{Result, RosterError};
use crate::model::Employee;

/// Header row of the export, in column order.
pub const EXPORT_FIELDS: [&str; 5] = ["id", "name", "username", "email", "managedBy"];

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// A rendered export ready to be sent or written.
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
    pub rows: usize,
}

pub async fn export_csv(db: &Db, config: &ExportConfig) -> Result<CsvExport> {
    let all = db.with_connection(|conn| employees::fetch_all(conn)).await?;
    let body = render_csv(&all)?;
    let filename = export_filename(&config.filename_prefix, Utc::now());

    log::info!("Exported {} employees as {}", all.len(), filename);

    Ok(CsvExport {
        body,
        content_type: CSV_CONTENT_TYPE,
        filename,
        rows: all.len(),
    })
}

/// Render employees as CSV with the [`EXPORT_FIELDS`] header.
///
/// The output is accepted as-is by the importer.
pub fn render_csv(employees: &[Employee]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_FIELDS).map_err(write_error)?;

    for employee in employees {
        let id = employee.id.to_string();
        let managed_by = employee
            .managed_by
            .map(|parent| parent.to_string())
            .unwrap_or_default();
        writer
            .write_record([
                id.as_str(),
                employee.name.as_str(),
                employee.username.as_deref().unwrap_or(""),
                employee.email.as_deref().unwrap_or(""),
                managed_by.as_str(),
            ])
            .map_err(write_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| RosterError::Internal(format!("failed to flush CSV export: {}", e)))
}

pub fn export_filename(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}.csv", prefix, at.format("%Y%m%d-%H%M%S"))
}

fn write_error(err: csv::Error) -> RosterError {
    RosterError::Internal(format!("failed to write CSV export: {}", err))
}
