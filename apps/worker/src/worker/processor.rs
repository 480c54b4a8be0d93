//! Job Processor: drives one claimed job through
//! render → compile → cleanup → upload → record.
//!
//! Every pipeline failure is caught here and recorded as FAILED with a
//! summary in `error_log`. Only a failure to write that terminal status
//! escapes, because the worker cannot continue safely without the store.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::WorkerContext;
use crate::errors::{PipelineError, StoreError};
use crate::models::generation::validate_output_filename;
use crate::models::{Job, JobUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
}

struct PipelineOutput {
    pdf_path: String,
    drive_link: Option<String>,
}

#[derive(Clone)]
pub struct JobProcessor {
    ctx: Arc<WorkerContext>,
}

impl JobProcessor {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    /// Runs the pipeline for a job already in PROCESSING and records the
    /// terminal status.
    pub async fn process(&self, job: &Job) -> Result<JobOutcome, StoreError> {
        info!("Processing job {} ({})", job.id, job.output_filename);

        let (update, outcome) = match self.run_pipeline(job).await {
            Ok(output) => (
                JobUpdate::Completed {
                    pdf_path: output.pdf_path,
                    drive_link: output.drive_link,
                },
                JobOutcome::Completed,
            ),
            Err(e) => {
                error!("Job {} FAILED ({}): {e}", job.id, job.output_filename);
                warn!("Job {} failure detail: {e:?}", job.id);
                (
                    JobUpdate::Failed {
                        error_log: e.to_string(),
                    },
                    JobOutcome::Failed,
                )
            }
        };

        self.ctx.store.update_status(job.id, update).await?;

        if outcome == JobOutcome::Completed {
            info!("Job {} COMPLETED ({})", job.id, job.output_filename);
        }
        Ok(outcome)
    }

    /// Re-entrant: every run starts from the payload and overwrites any
    /// files a previous attempt left behind.
    async fn run_pipeline(&self, job: &Job) -> Result<PipelineOutput, PipelineError> {
        validate_output_filename(&job.output_filename).map_err(PipelineError::InvalidJob)?;
        let settings = &self.ctx.settings;

        let source = self.ctx.builder.render(&job.resume_data)?;

        tokio::fs::create_dir_all(&settings.output_dir).await?;
        let source_path = settings
            .output_dir
            .join(format!("{}.tex", job.output_filename));
        tokio::fs::write(&source_path, source).await?;

        let artifact = self.ctx.builder.compile(&source_path).await?;
        remove_source(&source_path).await;

        let file_name = artifact
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PipelineError::InvalidJob(format!(
                    "artifact path {} has no file name",
                    artifact.display()
                ))
            })?;
        let pdf_path = format!(
            "{}/{}",
            settings.artifact_url_prefix.trim_end_matches('/'),
            file_name
        );
        info!("Compiled {pdf_path}");

        let drive_link = match &self.ctx.archiver {
            Some(archiver) => {
                info!("Uploading {file_name} to archive ({})", job.meta_code);
                let link = archiver.upload(&artifact, &job.meta_code).await?;
                info!("Archived at {link}");
                Some(link)
            }
            None => None,
        };

        Ok(PipelineOutput {
            pdf_path,
            drive_link,
        })
    }
}

/// The `.tex` source is transient; losing the cleanup is not a job failure.
async fn remove_source(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {e}", path.display()),
    }
}
