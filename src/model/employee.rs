//! Employee record, its reduced projections, and the untyped CSV row it is built from.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Stable employee identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub i64);

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored employee. `managed_by` is the self-referential parent link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub managed_by: Option<EmployeeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn summary(&self) -> EmployeeSummary {
        EmployeeSummary {
            id: self.id,
            name: self.name.clone(),
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Reduced projection used for direct reports and tree nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeSummary {
    pub id: EmployeeId,
    pub name: String,
    pub username: Option<String>,
    pub avatar: Option<String>,
}

/// List row: every scalar field except the parent link, plus direct reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeWithChildren {
    pub id: EmployeeId,
    pub name: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub children: Vec<EmployeeSummary>,
}

/// Node of a nested org tree returned by subtree traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgNode {
    #[serde(flatten)]
    pub employee: EmployeeSummary,
    pub children: Vec<OrgNode>,
}

/// Why a single row could not become an [`Employee`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("required field `{0}` is missing")]
    Missing(&'static str),

    #[error("field `{field}` has invalid value `{value}`: {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// One CSV row keyed by normalized header, all text, nothing validated yet.
///
/// Header names are normalized before deserializing (lowercase, no `_`, `-`
/// or spaces), which is why the renames below are all lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmployeeDraft {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(alias = "handle", alias = "login")]
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(alias = "avatarurl")]
    pub avatar: Option<String>,
    #[serde(rename = "managedby", alias = "managerid", alias = "parentid")]
    pub managed_by: Option<String>,
    #[serde(rename = "createdat")]
    pub created_at: Option<String>,
    #[serde(rename = "updatedat")]
    pub updated_at: Option<String>,
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_id(field: &'static str, raw: &str) -> Result<EmployeeId, FieldError> {
    raw.parse::<i64>()
        .map(EmployeeId)
        .map_err(|_| FieldError::Invalid {
            field,
            value: raw.to_string(),
            reason: "expected an integer",
        })
}

fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, FieldError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| FieldError::Invalid {
            field,
            value: raw.to_string(),
            reason: "expected an RFC 3339 timestamp",
        })
}

impl EmployeeDraft {
    /// The id as written, if it parses; used to attribute failures of other fields.
    pub fn parsed_id(&self) -> Option<EmployeeId> {
        self.id
            .as_deref()
            .map(str::trim)
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(EmployeeId)
    }

    /// Coerce the text fields into a typed [`Employee`].
    ///
    /// Missing timestamps default to `now`; a missing `updatedAt` follows `createdAt`.
    pub fn into_employee(self, now: DateTime<Utc>) -> Result<Employee, FieldError> {
        let raw_id = non_blank(self.id).ok_or(FieldError::Missing("id"))?;
        let id = parse_id("id", &raw_id)?;

        let name = non_blank(self.name).ok_or(FieldError::Missing("name"))?;

        let email = non_blank(self.email);
        if let Some(ref email) = email {
            if !email_pattern().is_match(email) {
                return Err(FieldError::Invalid {
                    field: "email",
                    value: email.clone(),
                    reason: "expected an address like name@example.com",
                });
            }
        }

        let managed_by = match non_blank(self.managed_by) {
            Some(raw) => Some(parse_id("managedBy", &raw)?),
            None => None,
        };

        let created_at = match non_blank(self.created_at) {
            Some(raw) => parse_timestamp("createdAt", &raw)?,
            None => now,
        };
        let updated_at = match non_blank(self.updated_at) {
            Some(raw) => parse_timestamp("updatedAt", &raw)?,
            None => created_at,
        };

        Ok(Employee {
            id,
            name,
            username: non_blank(self.username),
            email,
            avatar: non_blank(self.avatar),
            managed_by,
            created_at,
            updated_at,
        })
    }
}
