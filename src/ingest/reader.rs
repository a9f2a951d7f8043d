//! Streaming row reader for delimited uploads.

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};
use std::io::Read;

use super::format::DelimitedFormat;
use super::validate::{Issue, IssueKind, ValidationReport};
use crate::error::{Result, RosterError};
use crate::model::EmployeeDraft;

const REQUIRED_COLUMNS: [&str; 2] = ["id", "name"];

/// Lowercase and strip separators so `Managed By`, `managed_by` and
/// `managedBy` all land on the same key.
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Lazy iterator over `(line, draft)` pairs.
pub struct DraftRows<R> {
    records: StringRecordsIntoIter<R>,
    headers: StringRecord,
}

impl<R: Read> Iterator for DraftRows<R> {
    type Item = Result<(u64, EmployeeDraft)>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };
        let line = record.position().map_or(0, |p| p.line());

        Some(
            record
                .deserialize::<EmployeeDraft>(Some(&self.headers))
                .map(|draft| (line, draft))
                .map_err(RosterError::from),
        )
    }
}

/// Open a delimited reader and check its header row.
///
/// A header without `id` or `name` fails before any data row is read.
pub fn read_drafts<R: Read>(reader: R, format: DelimitedFormat) -> Result<DraftRows<R>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(format.delimiter())
        .trim(Trim::All)
        .from_reader(reader);

    let headers: StringRecord = rdr.headers()?.iter().map(normalize_header).collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !headers.iter().any(|h| h == *required))
        .collect();
    if !missing.is_empty() {
        let issues = missing
            .iter()
            .map(|column| Issue {
                line: Some(1),
                id: None,
                kind: IssueKind::MissingColumn,
                message: format!("header row has no `{}` column", column),
            })
            .collect::<Vec<_>>();
        let cap = issues.len();
        return Err(RosterError::Validation(ValidationReport::new(issues, cap)));
    }

    rdr.set_headers(headers.clone());
    Ok(DraftRows {
        records: rdr.into_records(),
        headers,
    })
}
