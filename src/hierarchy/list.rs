use super::ChildJoin;
use crate::db::employees::summary_from_row;
use crate::db::Db;
use crate::error::Result;
use crate::model::{EmployeeId, EmployeeWithChildren};

/// Every employee with their direct reports, ordered by id.
///
/// One self-join; rows arrive ordered by parent id so consecutive rows are
/// folded into the same parent.
pub async fn list_employees(db: &Db, join: ChildJoin) -> Result<Vec<EmployeeWithChildren>> {
    let sql = format!(
        "SELECT p.id, p.name, p.username, p.email, p.avatar, p.created_at, p.updated_at, \
                c.id, c.name, c.username, c.avatar \
         FROM employees p \
         {} employees c ON c.managed_by = p.id \
         ORDER BY p.id, c.id",
        join.sql()
    );

    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out: Vec<EmployeeWithChildren> = Vec::new();

        while let Some(row) = rows.next()? {
            let id = EmployeeId(row.get(0)?);
            if out.last().map(|e| e.id) != Some(id) {
                out.push(EmployeeWithChildren {
                    id,
                    name: row.get(1)?,
                    username: row.get(2)?,
                    email: row.get(3)?,
                    avatar: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                    children: Vec::new(),
                });
            }

            if row.get::<_, Option<i64>>(7)?.is_some() {
                let child = summary_from_row(row, 7)?;
                if let Some(parent) = out.last_mut() {
                    parent.children.push(child);
                }
            }
        }

        Ok(out)
    })
    .await
}
