//! Depth-limited walks over `managed_by`.

use rusqlite::params;
use std::collections::{HashMap, HashSet};

use crate::db::employees::{fetch_one, summary_from_row};
use crate::db::Db;
use crate::error::{Result, RosterError};
use crate::model::{EmployeeId, EmployeeSummary, OrgNode};

/// Nested tree of everyone under `root`, at most `max_depth` levels down.
///
/// BFS one level at a time; `max_depth` of 0 returns the root alone.
pub async fn subtree(db: &Db, root: EmployeeId, max_depth: usize) -> Result<OrgNode> {
    db.with_connection(move |conn| {
        let root_employee = fetch_one(conn, root)?.ok_or(RosterError::NotFound(root.0))?;

        let mut stmt = conn.prepare(
            "SELECT id, name, username, avatar FROM employees WHERE managed_by = ?1 ORDER BY id",
        )?;
        let mut children_of: HashMap<EmployeeId, Vec<EmployeeSummary>> = HashMap::new();
        let mut visited: HashSet<EmployeeId> = HashSet::from([root]);
        let mut frontier = vec![root];
        let mut depth = 0;

        while !frontier.is_empty() && depth < max_depth {
            let mut next = Vec::new();
            for parent in &frontier {
                let rows = stmt.query_map(params![parent.0], |row| summary_from_row(row, 0))?;
                for row in rows {
                    let child = row?;
                    if visited.insert(child.id) {
                        next.push(child.id);
                        children_of.entry(*parent).or_default().push(child);
                    }
                }
            }
            frontier = next;
            depth += 1;
        }

        Ok(build_tree(root_employee.summary(), &mut children_of))
    })
    .await
}

fn build_tree(
    employee: EmployeeSummary,
    children_of: &mut HashMap<EmployeeId, Vec<EmployeeSummary>>,
) -> OrgNode {
    let children = children_of
        .remove(&employee.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| build_tree(child, children_of))
        .collect();
    OrgNode { employee, children }
}

/// Managers of `id`, nearest first, up to the root or `max_depth` hops.
pub async fn chain_of_command(
    db: &Db,
    id: EmployeeId,
    max_depth: usize,
) -> Result<Vec<EmployeeSummary>> {
    db.with_connection(move |conn| {
        let employee = fetch_one(conn, id)?.ok_or(RosterError::NotFound(id.0))?;

        let mut chain = Vec::new();
        let mut seen: HashSet<EmployeeId> = HashSet::from([id]);
        let mut next = employee.managed_by;

        while let Some(manager_id) = next {
            if chain.len() >= max_depth || !seen.insert(manager_id) {
                log::warn!("Chain of command for {} stopped at {}", id, manager_id);
                break;
            }
            let Some(manager) = fetch_one(conn, manager_id)? else {
                break;
            };
            next = manager.managed_by;
            chain.push(manager.summary());
        }

        Ok(chain)
    })
    .await
}
