use anyhow::{Context, Result};
use clap::Parser;
use roster::db::open_migrated;
use roster::export::export_csv;
use roster::Config;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "roster-export")]
#[command(about = "Export all employees as CSV")]
struct Args {
    /// Output file; `-` writes to stdout. Defaults to a timestamped name.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.roster.log_level.as_str()),
    )
    .init();

    let db = open_migrated(config.db_path(), config.migrations_dir()).await?;
    let export = export_csv(&db, &config.export).await?;

    match args.output {
        Some(path) if path.as_os_str() == "-" => {
            std::io::stdout()
                .write_all(&export.body)
                .context("Failed to write export to stdout")?;
        }
        output => {
            let path = output.unwrap_or_else(|| PathBuf::from(&export.filename));
            std::fs::write(&path, &export.body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {} employees to {}", export.rows, path.display());
        }
    }

    Ok(())
}
