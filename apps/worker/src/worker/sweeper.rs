//! Backlog Sweeper: drains every PENDING job present at startup, oldest
//! first, one at a time, before live watching begins.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{JobOutcome, JobProcessor};
use crate::errors::StoreError;
use crate::store::JobStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct Sweeper {
    store: Arc<dyn JobStore>,
    processor: JobProcessor,
}

impl Sweeper {
    pub fn new(store: Arc<dyn JobStore>, processor: JobProcessor) -> Self {
        Self { store, processor }
    }

    /// Claims and processes until nothing is PENDING or shutdown is requested.
    /// Shutdown is only honoured between jobs.
    pub async fn run(&self, shutdown: &CancellationToken) -> Result<SweepSummary, StoreError> {
        info!("Sweeping for backlog PENDING jobs...");
        let mut summary = SweepSummary::default();

        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested; stopping sweep");
                break;
            }

            let Some(job) = self.store.claim_next_pending().await? else {
                break;
            };

            info!("Backlog job: {} (created {})", job.output_filename, job.created_at);
            summary.processed += 1;
            match self.processor.process(&job).await? {
                JobOutcome::Completed => summary.completed += 1,
                JobOutcome::Failed => summary.failed += 1,
            }
        }

        info!(
            "Swept {} backlog jobs ({} completed, {} failed)",
            summary.processed, summary.completed, summary.failed
        );
        Ok(summary)
    }
}
