use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub list: ListConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Storage and process configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            migrations_dir: default_migrations_dir(),
        }
    }
}

/// How repeated identifiers inside one uploaded batch are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Every repeat of an id is reported as an issue
    #[default]
    Reject,
    /// The first row with a given id wins
    KeepFirst,
    /// The last row with a given id wins
    KeepLast,
}

/// Whether a batch with invalid rows may partially commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    #[default]
    AllOrNothing,
    /// Skip invalid rows (and their dependants), commit the rest
    ValidSubset,
}

/// Bulk ingest configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default)]
    pub commit_mode: CommitMode,
    /// Maximum hierarchy depth, root counts as 1
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_reported_issues")]
    pub max_reported_issues: usize,
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            duplicate_policy: DuplicatePolicy::default(),
            commit_mode: CommitMode::default(),
            max_depth: default_max_depth(),
            max_reported_issues: default_max_reported_issues(),
            conflict_retries: default_conflict_retries(),
        }
    }
}

/// Hierarchical list configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListConfig {
    /// When true, the list drops employees without direct reports (inner join)
    #[serde(default)]
    pub require_children: bool,
}

/// Export configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            filename_prefix: default_filename_prefix(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("roster.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_depth() -> usize {
    64
}

fn default_max_reported_issues() -> usize {
    100
}

fn default_conflict_retries() -> usize {
    3
}

fn default_filename_prefix() -> String {
    "employees".to_string()
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in ROSTER_CONFIG environment variable (must exist)
    /// 2. ./config.toml in current directory
    /// 3. Built-in defaults
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = match std::env::var("ROSTER_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let local = PathBuf::from("config.toml");
                if !local.exists() {
                    let config = Config::default();
                    config.validate()?;
                    return Ok(config);
                }
                local
            }
        };

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.ingest.max_upload_bytes == 0 {
            anyhow::bail!("ingest.max_upload_bytes must be greater than 0");
        }

        if self.ingest.max_depth == 0 {
            anyhow::bail!("ingest.max_depth must be greater than 0");
        }

        if self.ingest.max_reported_issues == 0 {
            anyhow::bail!("ingest.max_reported_issues must be greater than 0");
        }

        if self.export.filename_prefix.trim().is_empty() {
            anyhow::bail!("export.filename_prefix must not be empty");
        }

        if self
            .export
            .filename_prefix
            .chars()
            .any(|c| c == '"' || c == '/' || c == '\\' || c.is_control())
        {
            anyhow::bail!("export.filename_prefix contains characters not allowed in a filename");
        }

        if self.http_server.port == 0 {
            anyhow::bail!("http_server.port must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.roster.db_path
    }

    /// Get migrations directory
    pub fn migrations_dir(&self) -> &Path {
        &self.roster.migrations_dir
    }
}
