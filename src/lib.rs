pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod hierarchy;
pub mod http;
pub mod ingest;
pub mod model;

pub use config::Config;
pub use error::{Result, RosterError};
pub use hierarchy::{chain_of_command, list_employees, subtree, ChildJoin};
pub use ingest::{ImportSummary, Importer, Upload, ValidationReport};
pub use model::{Employee, EmployeeId, EmployeeSummary, EmployeeWithChildren, OrgNode};
