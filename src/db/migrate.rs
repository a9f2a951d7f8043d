use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;

use crate::error::{Result, RosterError};

/// One `NNN_name.sql` file from the migrations directory.
struct SchemaMigration {
    version: u32,
    name: String,
    sql: String,
}

impl SchemaMigration {
    /// `None` for files that are not `.sql`; an error for `.sql` files
    /// without a numeric `NNN_` prefix.
    fn from_path(path: &Path) -> Result<Option<Self>> {
        if path.extension().and_then(|e| e.to_str()) != Some("sql") {
            return Ok(None);
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| RosterError::Config(format!("Invalid migration file: {}", path.display())))?
            .to_string();

        let version = name
            .split_once('_')
            .and_then(|(prefix, _)| prefix.parse::<u32>().ok())
            .ok_or_else(|| {
                RosterError::Config(format!("Migration {} has no numeric version prefix", name))
            })?;

        let sql = fs::read_to_string(path)?;
        Ok(Some(Self { version, name, sql }))
    }
}

/// Versions already recorded in `schema_migrations`, ascending.
pub fn applied_versions(conn: &Connection) -> Result<Vec<u32>> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, u32>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(versions)
}

fn load_migrations(dir: &Path) -> Result<Vec<SchemaMigration>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        RosterError::Config(format!("Cannot read migrations directory {}: {}", dir.display(), e))
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        if let Some(migration) = SchemaMigration::from_path(&entry?.path())? {
            migrations.push(migration);
        }
    }
    migrations.sort_by_key(|m| m.version);

    if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(RosterError::Config(format!(
            "Migrations {} and {} share version {}",
            pair[0].name, pair[1].name, pair[0].version
        )));
    }

    Ok(migrations)
}

/// Apply every migration in `dir` that is not yet recorded, each in its own
/// transaction.
pub fn run_migrations(conn: &mut Connection, dir: &Path) -> Result<()> {
    let applied = applied_versions(conn)?;
    let pending: Vec<_> = load_migrations(dir)?
        .into_iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();

    if pending.is_empty() {
        log::debug!("Schema up to date ({} migrations applied)", applied.len());
        return Ok(());
    }

    for migration in pending {
        log::info!("Applying migration {}", migration.name);

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            RosterError::Config(format!("Migration {} failed: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn project_migrations() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    }

    fn names_of(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap()
    }

    fn migrated_conn(temp_dir: &TempDir) -> Connection {
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        run_migrations(&mut conn, &project_migrations()).unwrap();
        conn
    }

    #[test]
    fn test_load_migrations_orders_by_version() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("010_later.sql"), "CREATE TABLE later (id INTEGER);").unwrap();
        fs::write(dir.join("002_sooner.sql"), "CREATE TABLE sooner (id INTEGER);").unwrap();
        fs::write(dir.join("README.md"), "not a migration").unwrap();

        let migrations = load_migrations(dir).unwrap();
        let versions: Vec<u32> = migrations.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![2, 10]);
        assert_eq!(migrations[0].name, "002_sooner");
    }

    #[test]
    fn test_unnumbered_or_clashing_files_are_config_errors() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("seed.sql"), "SELECT 1;").unwrap();
        assert!(matches!(load_migrations(dir), Err(RosterError::Config(_))));

        fs::remove_file(dir.join("seed.sql")).unwrap();
        fs::write(dir.join("001_a.sql"), "SELECT 1;").unwrap();
        fs::write(dir.join("001_b.sql"), "SELECT 1;").unwrap();
        assert!(matches!(load_migrations(dir), Err(RosterError::Config(_))));
    }

    #[test]
    fn test_missing_migrations_dir_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        let result = run_migrations(&mut conn, &temp_dir.path().join("nope"));
        assert!(matches!(result, Err(RosterError::Config(_))));
    }

    #[test]
    fn test_broken_migration_names_the_file_and_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("migrations");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("001_ok.sql"), "CREATE TABLE ok (id INTEGER);").unwrap();
        fs::write(
            dir.join("002_broken.sql"),
            "CREATE TABLE half (id INTEGER); CREATE TABLEX nope;",
        )
        .unwrap();

        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        match run_migrations(&mut conn, &dir) {
            Err(RosterError::Config(msg)) => assert!(msg.contains("002_broken"), "{}", msg),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }

        assert_eq!(applied_versions(&conn).unwrap(), vec![1]);
        let tables = names_of(&conn, "table");
        assert!(tables.contains(&"ok".to_string()));
        assert!(!tables.contains(&"half".to_string()));
    }

    #[test]
    fn test_full_migration_schema() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = migrated_conn(&temp_dir);
        // Second run is a no-op
        run_migrations(&mut conn, &project_migrations()).unwrap();

        let tables = names_of(&conn, "table");
        for table in ["employees", "store_meta", "import_batches", "schema_migrations"] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
        assert!(names_of(&conn, "index").contains(&"idx_employees_managed_by".to_string()));
        assert!(names_of(&conn, "trigger").contains(&"employees_id_immutable".to_string()));

        let generation: i64 = conn
            .query_row("SELECT value FROM store_meta WHERE key = 'generation'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(generation, 0);
        assert_eq!(applied_versions(&conn).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_employee_id_is_immutable() {
        let temp_dir = TempDir::new().unwrap();
        let conn = migrated_conn(&temp_dir);

        conn.execute(
            "INSERT INTO employees (id, name, created_at, updated_at) VALUES (1, 'Alice', 'x', 'x')",
            [],
        )
        .unwrap();

        let result = conn.execute("UPDATE employees SET id = 2 WHERE id = 1", []);
        assert!(result.is_err());

        // Other columns stay writable
        conn.execute("UPDATE employees SET name = 'Alicia' WHERE id = 1", []).unwrap();
    }

    #[test]
    fn test_self_reference_rejected_by_schema() {
        let temp_dir = TempDir::new().unwrap();
        let conn = migrated_conn(&temp_dir);

        let result = conn.execute(
            "INSERT INTO employees (id, name, managed_by, created_at, updated_at) VALUES (1, 'Alice', 1, 'x', 'x')",
            [],
        );
        assert!(result.is_err());
    }
}
