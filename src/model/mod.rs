//! Domain types for the employee hierarchy.

pub mod employee;

pub use employee::{
    Employee, EmployeeDraft, EmployeeId, EmployeeSummary, EmployeeWithChildren, FieldError, OrgNode,
};
