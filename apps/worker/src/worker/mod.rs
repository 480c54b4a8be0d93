//! Job processing core.
//!
//! Startup: report stale PROCESSING jobs, drain the backlog with the
//! [`Sweeper`], then hand over to the [`Watcher`] until shutdown. Both paths
//! feed claimed jobs into the [`JobProcessor`] one at a time; there is no
//! in-process parallelism. Cross-process safety comes from the store's
//! atomic claims only.

pub mod processor;
pub mod sweeper;
pub mod watcher;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::archive::Archiver;
use crate::builder::DocumentBuilder;
use crate::config::Config;
use crate::errors::StoreError;
use crate::models::Job;
use crate::store::JobStore;

pub use processor::{JobOutcome, JobProcessor};
pub use sweeper::Sweeper;
pub use watcher::Watcher;

/// Tunables the core reads; derived from [`Config`] once at startup.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub output_dir: PathBuf,
    pub artifact_url_prefix: String,
    pub watch_backoff: Duration,
    pub stale_processing_after: chrono::Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            artifact_url_prefix: config.artifact_url_prefix.clone(),
            watch_backoff: config.watch_backoff,
            stale_processing_after: config.stale_processing_after,
        }
    }
}

/// Everything the core needs, constructed once in `main` and shared by handle.
pub struct WorkerContext {
    pub store: Arc<dyn JobStore>,
    pub builder: Arc<dyn DocumentBuilder>,
    /// `None` when archiving is not configured; uploads are then skipped.
    pub archiver: Option<Arc<dyn Archiver>>,
    pub settings: WorkerSettings,
}

pub struct Worker {
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    /// Runs until `shutdown` is cancelled or a store error makes it unsafe to go on.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), StoreError> {
        info!("Resume worker started");
        if self.ctx.archiver.is_none() {
            warn!("Archiving is not configured. Uploads will be skipped.");
        }

        self.report_stale_processing().await?;

        let processor = JobProcessor::new(Arc::clone(&self.ctx));
        Sweeper::new(Arc::clone(&self.ctx.store), processor.clone())
            .run(&shutdown)
            .await?;

        if shutdown.is_cancelled() {
            info!("Shutdown requested before live watch");
            return Ok(());
        }

        Watcher::new(
            Arc::clone(&self.ctx.store),
            processor,
            self.ctx.settings.watch_backoff,
        )
        .run(&shutdown)
        .await
    }

    /// Logs jobs left in PROCESSING by a worker that died mid-pipeline.
    /// They are reported only; the sweep looks at PENDING jobs exclusively,
    /// so these stay put until an operator reconciles them.
    pub async fn report_stale_processing(&self) -> Result<Vec<Job>, StoreError> {
        // An age reaching past the representable range means nothing can be stale.
        let cutoff = Utc::now()
            .checked_sub_signed(self.ctx.settings.stale_processing_after)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let stale = self
            .ctx
            .store
            .list_stale_processing(cutoff)
            .await?;

        for job in &stale {
            warn!(
                "Job {} ({}) has been PROCESSING since {}; it will not be retried automatically",
                job.id, job.output_filename, job.updated_at
            );
        }
        if !stale.is_empty() {
            warn!("{} stale PROCESSING job(s) need manual reconciliation", stale.len());
        }
        Ok(stale)
    }
}
