use anyhow::{Context, Result};
use clap::Parser;
use roster::config::CommitMode;
use roster::db::open_migrated;
use roster::error::RosterError;
use roster::ingest::{Importer, Upload};
use roster::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "roster-import")]
#[command(about = "Import employees from a CSV or TSV file")]
struct Args {
    /// File to import
    file: PathBuf,

    /// Declared content type (detected from the extension when omitted)
    #[arg(long)]
    content_type: Option<String>,

    /// Commit the valid rows even when others fail validation
    #[arg(long)]
    valid_subset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.roster.log_level.as_str()),
    )
    .init();

    if args.valid_subset {
        config.ingest.commit_mode = CommitMode::ValidSubset;
    }

    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    if bytes.len() > config.ingest.max_upload_bytes {
        anyhow::bail!(
            "{} is {} bytes, over the {} byte upload limit",
            args.file.display(),
            bytes.len(),
            config.ingest.max_upload_bytes
        );
    }

    let db = open_migrated(config.db_path(), config.migrations_dir()).await?;
    let importer = Importer::new(db, config.ingest.clone());

    let upload = Upload {
        file_name: args
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        content_type: args.content_type,
        bytes,
    };

    match importer.import(upload).await {
        Ok(summary) => {
            println!(
                "Imported {} of {} rows (batch {}, generation {})",
                summary.inserted, summary.rows_read, summary.batch_id, summary.generation
            );
            if summary.duplicates_resolved > 0 {
                println!("{} duplicate rows resolved", summary.duplicates_resolved);
            }
            for issue in &summary.skipped {
                println!("  skipped {}", issue);
            }
            Ok(())
        }
        Err(RosterError::Validation(report)) => {
            eprintln!("Import rejected with {} issue(s):", report.total);
            for issue in &report.issues {
                eprintln!("  {}", issue);
            }
            if report.truncated {
                eprintln!("  ... {} more", report.total - report.issues.len());
            }
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
