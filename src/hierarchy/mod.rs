//! Read side of the org chart: flat listing with direct reports, and
//! depth-limited walks down (subtree) and up (chain of command).

mod list;
mod traversal;

pub use list::list_employees;
pub use traversal::{chain_of_command, subtree};

/// How the list query joins parents to their direct reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildJoin {
    /// Every employee, with an empty `children` array when they manage nobody.
    #[default]
    Optional,
    /// Only employees that manage at least one person.
    Required,
}

impl ChildJoin {
    pub fn from_flag(children_only: bool) -> Self {
        if children_only {
            ChildJoin::Required
        } else {
            ChildJoin::Optional
        }
    }

    fn sql(self) -> &'static str {
        match self {
            ChildJoin::Optional => "LEFT JOIN",
            ChildJoin::Required => "JOIN",
        }
    }
}
