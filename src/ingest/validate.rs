//! Batch validation against a snapshot of the store.
//!
//! Everything here is pure: rows and the `(id, managed_by)` arena go in, an
//! ordered list of accepted employees (parents first) or a report comes out.
//! The store is only touched by `db_writer`.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::{CommitMode, DuplicatePolicy, IngestConfig};
use crate::error::{Result, RosterError};
use crate::model::{Employee, EmployeeId};

/// A row that passed schema coercion and awaits batch-level checks.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub line: u64,
    pub employee: Employee,
}

/// The parts of the store that validation depends on.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub generation: i64,
    /// Every stored id mapped to its parent.
    pub parents: HashMap<EmployeeId, Option<EmployeeId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingColumn,
    EmptyBatch,
    InvalidField,
    DuplicateId,
    IdExists,
    UnknownParent,
    SelfReference,
    Cycle,
    DepthExceeded,
    ParentRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub line: Option<u64>,
    pub id: Option<EmployeeId>,
    pub kind: IssueKind,
    pub message: String,
}

impl Issue {
    pub fn row(line: u64, id: Option<EmployeeId>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            id,
            kind,
            message: message.into(),
        }
    }

    pub fn batch(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            line: None,
            id: None,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Accumulated validation failures, capped for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<Issue>,
    /// Issue count before the cap was applied.
    pub total: usize,
    pub truncated: bool,
}

impl ValidationReport {
    pub fn new(mut issues: Vec<Issue>, cap: usize) -> Self {
        let total = issues.len();
        let truncated = total > cap;
        issues.truncate(cap);
        Self {
            issues,
            total,
            truncated,
        }
    }

    pub fn single(issue: Issue) -> Self {
        Self::new(vec![issue], 1)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} issue(s)", self.total)?;
        if let Some(first) = self.issues.first() {
            write!(f, "; first: {}", first)?;
        }
        Ok(())
    }
}

/// Knobs from `[ingest]` that shape validation.
#[derive(Debug, Clone, Copy)]
pub struct ValidationPolicy {
    pub duplicates: DuplicatePolicy,
    pub commit_mode: CommitMode,
    pub max_depth: usize,
    pub max_reported_issues: usize,
}

impl From<&IngestConfig> for ValidationPolicy {
    fn from(config: &IngestConfig) -> Self {
        Self {
            duplicates: config.duplicate_policy,
            commit_mode: config.commit_mode,
            max_depth: config.max_depth,
            max_reported_issues: config.max_reported_issues,
        }
    }
}

/// Outcome of a batch that may be committed.
#[derive(Debug, Clone)]
pub struct ValidatedBatch {
    /// Accepted employees, parents before children.
    pub employees: Vec<Employee>,
    /// Issues for rows left out (only non-empty in `valid_subset` mode).
    pub skipped: Vec<Issue>,
    /// Rows dropped by `keep_first` / `keep_last`.
    pub duplicates_resolved: usize,
}

enum Walk {
    Visiting,
    Done(usize),
    Faulted,
}

/// Validate a parsed batch against the store snapshot.
///
/// `row_issues` are the schema failures from row coercion; they count as
/// issues and their ids (when parseable) are treated as rejected parents.
pub fn validate_batch(
    rows: &[CandidateRow],
    row_issues: &[Issue],
    snapshot: &StoreSnapshot,
    policy: &ValidationPolicy,
) -> Result<ValidatedBatch> {
    let mut issues: Vec<Issue> = row_issues.to_vec();

    // Duplicate ids within the batch
    let mut by_id: HashMap<EmployeeId, usize> = HashMap::new();
    let mut kept: Vec<&CandidateRow> = Vec::new();
    let mut duplicate_ids: HashSet<EmployeeId> = HashSet::new();
    let mut duplicates_resolved = 0;

    for row in rows {
        let id = row.employee.id;
        match by_id.get(&id) {
            None => {
                by_id.insert(id, kept.len());
                kept.push(row);
            }
            Some(&idx) => match policy.duplicates {
                DuplicatePolicy::Reject => {
                    let first_line = kept[idx].line;
                    // Every occurrence is dropped, so the first one is reported too
                    if duplicate_ids.insert(id) {
                        issues.push(Issue::row(
                            first_line,
                            Some(id),
                            IssueKind::DuplicateId,
                            format!("duplicate id {} (also on line {})", id, row.line),
                        ));
                    }
                    issues.push(Issue::row(
                        row.line,
                        Some(id),
                        IssueKind::DuplicateId,
                        format!("duplicate id {} (first seen on line {})", id, first_line),
                    ));
                }
                DuplicatePolicy::KeepFirst => duplicates_resolved += 1,
                DuplicatePolicy::KeepLast => {
                    kept[idx] = row;
                    duplicates_resolved += 1;
                }
            },
        }
    }

    let candidates: HashMap<EmployeeId, &CandidateRow> = kept
        .iter()
        .filter(|row| !duplicate_ids.contains(&row.employee.id))
        .map(|row| (row.employee.id, *row))
        .collect();

    let mut ordered: Vec<&CandidateRow> = candidates.values().copied().collect();
    ordered.sort_by_key(|row| row.line);

    let mut rejected: HashSet<EmployeeId> = row_issues.iter().filter_map(|issue| issue.id).collect();
    rejected.extend(duplicate_ids.iter().copied());
    rejected.retain(|id| !candidates.contains_key(id));

    // Identity and parent resolution
    let mut faulted: HashSet<EmployeeId> = HashSet::new();
    for row in &ordered {
        let employee = &row.employee;
        if snapshot.parents.contains_key(&employee.id) {
            issues.push(Issue::row(
                row.line,
                Some(employee.id),
                IssueKind::IdExists,
                format!("id {} already exists and ids cannot be reassigned", employee.id),
            ));
            faulted.insert(employee.id);
            continue;
        }

        let Some(parent) = employee.managed_by else {
            continue;
        };
        if parent == employee.id {
            issues.push(Issue::row(
                row.line,
                Some(employee.id),
                IssueKind::SelfReference,
                format!("employee {} cannot manage itself", employee.id),
            ));
            faulted.insert(employee.id);
        } else if rejected.contains(&parent) {
            issues.push(Issue::row(
                row.line,
                Some(employee.id),
                IssueKind::ParentRejected,
                format!("manager {} was rejected", parent),
            ));
            faulted.insert(employee.id);
        } else if !candidates.contains_key(&parent) && !snapshot.parents.contains_key(&parent) {
            issues.push(Issue::row(
                row.line,
                Some(employee.id),
                IssueKind::UnknownParent,
                format!("manager {} does not exist", parent),
            ));
            faulted.insert(employee.id);
        }
    }

    // Walk parent links: cycles, depth, and inherited rejection
    let mut state: HashMap<EmployeeId, Walk> =
        faulted.iter().map(|id| (*id, Walk::Faulted)).collect();
    let mut existing_depths: HashMap<EmployeeId, usize> = HashMap::new();
    let mut cycle_members: HashSet<EmployeeId> = HashSet::new();

    for row in &ordered {
        let mut path: Vec<EmployeeId> = Vec::new();
        let mut current = row.employee.id;

        let base = loop {
            match state.get(&current) {
                Some(Walk::Done(depth)) => break Some(*depth),
                Some(Walk::Faulted) => break None,
                Some(Walk::Visiting) => {
                    let start = path.iter().position(|id| *id == current).unwrap_or(0);
                    cycle_members.extend(path[start..].iter().copied());
                    break None;
                }
                None => {}
            }

            let Some(candidate) = candidates.get(&current) else {
                break Some(existing_depth(current, &snapshot.parents, &mut existing_depths));
            };

            state.insert(current, Walk::Visiting);
            path.push(current);
            match candidate.employee.managed_by {
                None => break Some(0),
                Some(parent) => current = parent,
            }
        };

        match base {
            Some(base) => {
                for (offset, id) in path.iter().rev().enumerate() {
                    state.insert(*id, Walk::Done(base + offset + 1));
                }
            }
            None => {
                for id in path {
                    state.insert(id, Walk::Faulted);
                }
            }
        }
    }

    let mut accepted: Vec<(usize, &CandidateRow)> = Vec::new();
    for row in &ordered {
        let id = row.employee.id;
        if faulted.contains(&id) {
            continue;
        }
        if cycle_members.contains(&id) {
            issues.push(Issue::row(
                row.line,
                Some(id),
                IssueKind::Cycle,
                format!("employee {} is part of a management cycle", id),
            ));
            continue;
        }
        match state.get(&id) {
            Some(Walk::Done(depth)) if *depth > policy.max_depth => {
                issues.push(Issue::row(
                    row.line,
                    Some(id),
                    IssueKind::DepthExceeded,
                    format!(
                        "employee {} sits at depth {}, deeper than the limit of {}",
                        id, depth, policy.max_depth
                    ),
                ));
            }
            Some(Walk::Done(depth)) => accepted.push((*depth, *row)),
            _ => {
                issues.push(Issue::row(
                    row.line,
                    Some(id),
                    IssueKind::ParentRejected,
                    format!("employee {} reports into a rejected record", id),
                ));
            }
        }
    }

    issues.sort_by_key(|issue| issue.line);

    if !issues.is_empty() && policy.commit_mode == CommitMode::AllOrNothing {
        return Err(RosterError::Validation(ValidationReport::new(
            issues,
            policy.max_reported_issues,
        )));
    }

    accepted.sort_by_key(|(depth, row)| (*depth, row.line));

    Ok(ValidatedBatch {
        employees: accepted.into_iter().map(|(_, row)| row.employee.clone()).collect(),
        skipped: issues,
        duplicates_resolved,
    })
}

/// Depth of an already stored employee (root = 1).
///
/// Stored data is acyclic; the walk still stops after visiting every stored
/// id once so a corrupted table cannot hang an import.
fn existing_depth(
    id: EmployeeId,
    parents: &HashMap<EmployeeId, Option<EmployeeId>>,
    memo: &mut HashMap<EmployeeId, usize>,
) -> usize {
    let mut chain = Vec::new();
    let mut current = Some(id);
    let mut base = 0;

    while let Some(node) = current {
        if let Some(depth) = memo.get(&node) {
            base = *depth;
            break;
        }
        if chain.len() > parents.len() {
            break;
        }
        chain.push(node);
        current = parents.get(&node).copied().flatten();
    }

    for (offset, node) in chain.iter().rev().enumerate() {
        memo.insert(*node, base + offset + 1);
    }

    memo.get(&id).copied().unwrap_or(base)
}
