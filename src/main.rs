use anyhow::Result;
use roster::db::{employees, migrate, open_migrated};
use roster::error::RosterError;
use roster::http::HttpServer;
use roster::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.roster.log_level.as_str()),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => run_http_server(config).await?,
        "verify" => run_schema_verification(config).await?,
        other => {
            anyhow::bail!("Unknown command `{}`. Usage: roster [serve|verify]", other);
        }
    }

    Ok(())
}

async fn run_http_server(config: Config) -> Result<()> {
    log::info!("Starting roster HTTP server v{}", env!("CARGO_PKG_VERSION"));

    let db = open_migrated(config.db_path(), config.migrations_dir()).await?;
    log::info!("Database initialized: {}", config.db_path().display());

    HttpServer::new(db, config).run().await?;
    Ok(())
}

/// Apply migrations and check that the schema and pragmas are what the
/// importer relies on.
async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("Starting roster v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Migrations: {}", config.migrations_dir().display());

    let db = open_migrated(config.db_path(), config.migrations_dir()).await?;

    db.with_connection(|conn| {
        let names = |kind: &str| -> Result<Vec<String>, RosterError> {
            let mut stmt =
                conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")?;
            let rows = stmt
                .query_map([kind], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
            Ok(rows)
        };

        let tables = names("table")?;
        for table in ["employees", "import_batches", "schema_migrations", "store_meta"] {
            if !tables.iter().any(|t| t == table) {
                return Err(RosterError::Config(format!("Missing table: {}", table)));
            }
            log::debug!("✓ Table exists: {}", table);
        }

        if !names("trigger")?.iter().any(|t| t == "employees_id_immutable") {
            return Err(RosterError::Config(
                "Missing trigger: employees_id_immutable".to_string(),
            ));
        }
        log::debug!("✓ Id immutability trigger exists");

        if !names("index")?.iter().any(|i| i == "idx_employees_managed_by") {
            log::warn!("Index idx_employees_managed_by not found; list and subtree queries will scan");
        }

        let applied = migrate::applied_versions(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(RosterError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(RosterError::Config("Foreign keys not enabled".to_string()));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(RosterError::Config(format!(
                "Database integrity check failed: {}",
                integrity
            )));
        }
        log::info!("✓ Database integrity: OK");

        log::info!(
            "{} employees stored, generation {}",
            employees::count(conn)?,
            employees::generation(conn)?
        );
        Ok(())
    })
    .await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
