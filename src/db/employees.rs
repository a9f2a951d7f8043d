//! Row mapping and plain reads for the `employees` table.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::model::{Employee, EmployeeId, EmployeeSummary};

pub(crate) const EMPLOYEE_COLUMNS: &str =
    "id, name, username, email, avatar, managed_by, created_at, updated_at";

pub(crate) fn employee_from_row(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: EmployeeId(row.get(0)?),
        name: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        avatar: row.get(4)?,
        managed_by: row.get::<_, Option<i64>>(5)?.map(EmployeeId),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

pub(crate) fn summary_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<EmployeeSummary> {
    Ok(EmployeeSummary {
        id: EmployeeId(row.get(offset)?),
        name: row.get(offset + 1)?,
        username: row.get(offset + 2)?,
        avatar: row.get(offset + 3)?,
    })
}

/// All employees ordered by id.
pub fn fetch_all(conn: &Connection) -> Result<Vec<Employee>> {
    let sql = format!("SELECT {} FROM employees ORDER BY id", EMPLOYEE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], employee_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn fetch_one(conn: &Connection, id: EmployeeId) -> Result<Option<Employee>> {
    let sql = format!("SELECT {} FROM employees WHERE id = ?1", EMPLOYEE_COLUMNS);
    let employee = conn
        .query_row(&sql, params![id.0], employee_from_row)
        .optional()?;
    Ok(employee)
}

pub fn count(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))?;
    Ok(n as usize)
}

/// Current store generation, bumped by every committed import.
pub fn generation(conn: &Connection) -> Result<i64> {
    let value: i64 = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'generation'",
        [],
        |row| row.get(0),
    )?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{migrate, Db};
    use crate::error::RosterError;
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

    #[tokio::test]
    async fn test_fetch_roundtrips_row() {
        let (db, _temp) = setup_test_db().await;

        db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO employees (id, name, username, email, avatar, managed_by, created_at, updated_at) \
                 VALUES (1, 'Alice', 'alice', 'alice@example.com', NULL, NULL, '2024-01-01T00:00:00Z', '2024-01-02T00:00:00Z')",
                [],
            )?;
            conn.execute(
                "INSERT INTO employees (id, name, managed_by, created_at, updated_at) \
                 VALUES (2, 'Bob', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
                [],
            )?;

            let all = fetch_all(conn)?;
            assert_eq!(all.len(), 2);
            assert_eq!(all[0].username.as_deref(), Some("alice"));
            assert_eq!(all[1].managed_by, Some(EmployeeId(1)));
            assert!(all[0].updated_at > all[0].created_at);

            assert_eq!(fetch_one(conn, EmployeeId(2))?.map(|e| e.name), Some("Bob".to_string()));
            assert!(fetch_one(conn, EmployeeId(9))?.is_none());
            assert_eq!(count(conn)?, 2);
            assert_eq!(generation(conn)?, 0);
            Ok::<(), RosterError>(())
        })
        .await
        .unwrap();
    }
}
