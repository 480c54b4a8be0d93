use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a generation job.
///
/// `Pending -> Processing -> {Completed, Failed}`. The last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle. The stores enforce
    /// this with guarded updates; tests check observed transitions against it.
    #[cfg(test)]
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Raw `generations` row as stored in PostgreSQL.
#[derive(Debug, Clone, FromRow)]
pub struct GenerationRow {
    pub id: Uuid,
    pub resume_id: Option<String>,
    pub version_number: Option<i32>,
    pub status: String,
    pub output_filename: String,
    pub resume_data: Value,
    pub meta_code: String,
    pub drive_link: Option<String>,
    pub pdf_path: Option<String>,
    pub error_log: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One resume-generation request tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub resume_id: Option<String>,
    pub version_number: Option<i32>,
    pub status: JobStatus,
    pub output_filename: String,
    pub resume_data: Value,
    pub meta_code: String,
    pub drive_link: Option<String>,
    pub pdf_path: Option<String>,
    pub error_log: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<GenerationRow> for Job {
    type Error = String;

    fn try_from(row: GenerationRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            resume_id: row.resume_id,
            version_number: row.version_number,
            status: row.status.parse()?,
            output_filename: row.output_filename,
            resume_data: row.resume_data,
            meta_code: row.meta_code,
            drive_link: row.drive_link,
            pdf_path: row.pdf_path,
            error_log: row.error_log,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A job as submitted by a producer. Always inserted as PENDING.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub resume_id: Option<String>,
    pub version_number: Option<i32>,
    pub output_filename: String,
    pub resume_data: Value,
    pub meta_code: String,
}

impl NewJob {
    pub fn new(output_filename: impl Into<String>, resume_data: Value) -> Self {
        Self {
            resume_id: None,
            version_number: None,
            output_filename: output_filename.into(),
            resume_data,
            meta_code: DEFAULT_META_CODE.to_string(),
        }
    }

    pub fn with_meta_code(mut self, meta_code: impl Into<String>) -> Self {
        self.meta_code = meta_code.into();
        self
    }
}

pub const DEFAULT_META_CODE: &str = "RES";

/// Output names become file names in the artifact area, so only a
/// conservative character set is accepted and path traversal is impossible.
pub fn validate_output_filename(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("output_filename must not be empty".to_string());
    }
    if name.len() > 200 {
        return Err("output_filename must be at most 200 characters".to_string());
    }
    if name.starts_with('.') {
        return Err("output_filename must not start with '.'".to_string());
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '_' | '-' | '.')))
    {
        return Err(format!("output_filename contains unsupported character {bad:?}"));
    }
    Ok(())
}

/// Terminal update written by the job processor.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Completed {
        pdf_path: String,
        drive_link: Option<String>,
    },
    Failed {
        error_log: String,
    },
}

impl JobUpdate {
    pub fn status(&self) -> JobStatus {
        match self {
            JobUpdate::Completed { .. } => JobStatus::Completed,
            JobUpdate::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Job counts per status, for operator visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: JobStatus, count: i64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
        }
    }
}
