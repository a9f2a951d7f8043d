use rusqlite::{params, TransactionBehavior};
use std::collections::HashMap;

use super::audit::{self, ImportRecord};
use super::validate::StoreSnapshot;
use crate::db::{employees, Db};
use crate::error::{Result, RosterError};
use crate::model::{Employee, EmployeeId};

/// Read the generation and the `(id, managed_by)` arena in one transaction.
pub async fn load_snapshot(db: &Db) -> Result<StoreSnapshot> {
    db.with_connection(|conn| {
        let tx = conn.transaction()?;
        let generation = employees::generation(&tx)?;

        let mut parents = HashMap::new();
        {
            let mut stmt = tx.prepare("SELECT id, managed_by FROM employees")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    EmployeeId(row.get(0)?),
                    row.get::<_, Option<i64>>(1)?.map(EmployeeId),
                ))
            })?;
            for row in rows {
                let (id, parent) = row?;
                parents.insert(id, parent);
            }
        }
        tx.commit()?;

        Ok(StoreSnapshot {
            generation,
            parents,
        })
    })
    .await
}

/// Insert a validated batch, bump the generation and record the import.
///
/// Takes the write lock up front and refuses to commit if another import
/// moved the generation since `expected_generation` was read. Returns the
/// new generation.
pub async fn commit_batch(
    db: &Db,
    batch: Vec<Employee>,
    expected_generation: i64,
    record: ImportRecord,
) -> Result<i64> {
    db.with_connection(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = employees::generation(&tx)?;
        if current != expected_generation {
            return Err(RosterError::Conflict(format!(
                "store generation moved from {} to {} during validation",
                expected_generation, current
            )));
        }

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO employees (
                    id, name, username, email, avatar, managed_by, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for employee in &batch {
                stmt.execute(params![
                    employee.id.0,
                    employee.name,
                    employee.username,
                    employee.email,
                    employee.avatar,
                    employee.managed_by.map(|p| p.0),
                    employee.created_at.to_rfc3339(),
                    employee.updated_at.to_rfc3339(),
                ])?;
            }
        }

        let next = current + 1;
        tx.execute(
            "UPDATE store_meta SET value = ?1 WHERE key = 'generation'",
            params![next],
        )?;
        audit::insert_record(&tx, &record, batch.len(), None)?;

        tx.commit()?;
        Ok(next)
    })
    .await
}
