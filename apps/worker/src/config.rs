use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context, Result};

/// Worker configuration loaded from environment variables.
/// Only `DATABASE_URL` is required; everything else has a default or
/// degrades functionality when absent.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub output_dir: PathBuf,
    /// Prefix of the `pdf_path` persisted on completed jobs.
    pub artifact_url_prefix: String,
    pub latex_bin: String,
    pub compile_timeout: Duration,
    pub watch_backoff: Duration,
    /// PROCESSING jobs untouched for longer than this are reported at startup.
    pub stale_processing_after: chrono::Duration,
    pub run_migrations: bool,
    /// Status/enqueue API is only served when a port is configured.
    pub port: Option<u16>,
    pub archive: Option<ArchiveConfig>,
    pub rust_log: String,
}

/// S3-compatible archive target. Present only when a bucket and credentials
/// are both configured.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub public_base_url: Option<String>,
    pub root_prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL")
            .context("Required environment variable 'DATABASE_URL' is not set")?;

        let port = var("PORT")
            .map(|p| p.parse::<u16>())
            .transpose()
            .context("PORT must be a valid port number")?;

        let backoff_secs: u64 = parse_or(&var, "WATCH_BACKOFF_SECS", 5)?;
        ensure!(backoff_secs >= 1, "WATCH_BACKOFF_SECS must be at least 1");

        let stale_minutes: i64 = parse_or(&var, "STALE_PROCESSING_MINUTES", 30)?;
        let stale_processing_after = chrono::Duration::try_minutes(stale_minutes)
            .filter(|age| *age > chrono::Duration::zero())
            .with_context(|| {
                format!("STALE_PROCESSING_MINUTES must be positive, not {stale_minutes}")
            })?;

        Ok(Config {
            database_url,
            output_dir: PathBuf::from(var("OUTPUT_DIR").unwrap_or_else(|| "output".to_string())),
            artifact_url_prefix: var("ARTIFACT_URL_PREFIX")
                .unwrap_or_else(|| "/output".to_string()),
            latex_bin: var("LATEX_BIN").unwrap_or_else(|| "pdflatex".to_string()),
            compile_timeout: Duration::from_secs(parse_or(&var, "COMPILE_TIMEOUT_SECS", 60)?),
            watch_backoff: Duration::from_secs(backoff_secs),
            stale_processing_after,
            run_migrations: parse_or(&var, "RUN_MIGRATIONS", true)?,
            port,
            archive: archive_config(&var),
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

/// Archiving is optional: a missing bucket or missing credentials disables it.
fn archive_config<F>(var: &F) -> Option<ArchiveConfig>
where
    F: Fn(&str) -> Option<String>,
{
    Some(ArchiveConfig {
        bucket: var("ARCHIVE_S3_BUCKET")?,
        access_key_id: var("AWS_ACCESS_KEY_ID")?,
        secret_access_key: var("AWS_SECRET_ACCESS_KEY")?,
        endpoint: var("ARCHIVE_S3_ENDPOINT"),
        region: var("ARCHIVE_S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        public_base_url: var("ARCHIVE_PUBLIC_BASE_URL"),
        root_prefix: var("ARCHIVE_ROOT_PREFIX").unwrap_or_else(|| "Resume".to_string()),
    })
}
