use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{future, StreamExt};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::{InsertEvent, InsertFeed, JobStore};
use crate::errors::StoreError;
use crate::models::generation::GenerationRow;
use crate::models::{Job, JobStatus, JobUpdate, NewJob, StatusCounts};

/// Channel the `generations_notify_insert` trigger publishes on.
pub const INSERT_CHANNEL: &str = "generation_inserted";

/// PostgreSQL-backed job store. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_job(row: GenerationRow) -> Result<Job, StoreError> {
    let id = row.id;
    Job::try_from(row).map_err(|reason| StoreError::CorruptRecord { id, reason })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn claim_next_pending(&self) -> Result<Option<Job>, StoreError> {
        // SKIP LOCKED: concurrent workers each take a different row.
        let row = sqlx::query_as::<_, GenerationRow>(
            r#"
            WITH next_job AS (
                SELECT id FROM generations
                WHERE status = 'PENDING'
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE generations
            SET status = 'PROCESSING',
                updated_at = NOW()
            WHERE id = (SELECT id FROM next_job)
            RETURNING *
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_job).transpose()
    }

    async fn claim_by_id(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, GenerationRow>(
            r#"
            UPDATE generations
            SET status = 'PROCESSING',
                updated_at = NOW()
            WHERE id = $1
              AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_job).transpose()
    }

    async fn subscribe_inserts(&self) -> Result<InsertFeed, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;
        listener
            .listen(INSERT_CHANNEL)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;

        info!("Listening on channel '{INSERT_CHANNEL}'");

        let feed = listener.into_stream().filter_map(|item| {
            future::ready(match item {
                Ok(notification) => match Uuid::parse_str(notification.payload()) {
                    Ok(job_id) => Some(Ok(InsertEvent { job_id })),
                    Err(e) => {
                        warn!(
                            "Ignoring malformed notification payload {:?}: {e}",
                            notification.payload()
                        );
                        None
                    }
                },
                Err(e) => Some(Err(StoreError::Subscription(e.to_string()))),
            })
        });

        Ok(feed.boxed())
    }

    async fn update_status(&self, id: Uuid, update: JobUpdate) -> Result<Job, StoreError> {
        let to = update.status();
        let (pdf_path, drive_link, error_log) = match update {
            JobUpdate::Completed {
                pdf_path,
                drive_link,
            } => (Some(pdf_path), drive_link, None),
            JobUpdate::Failed { error_log } => (None, None, Some(error_log)),
        };

        let row = sqlx::query_as::<_, GenerationRow>(
            r#"
            UPDATE generations
            SET status = $2,
                pdf_path = $3,
                drive_link = $4,
                error_log = $5,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'PROCESSING'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(pdf_path)
        .bind(drive_link)
        .bind(error_log)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => into_job(row),
            None => Err(StoreError::InvalidTransition { id, to }),
        }
    }

    async fn insert_job(&self, job: NewJob) -> Result<Job, StoreError> {
        let row = sqlx::query_as::<_, GenerationRow>(
            r#"
            INSERT INTO generations
                (id, resume_id, version_number, status, output_filename, resume_data, meta_code)
            VALUES ($1, $2, $3, 'PENDING', $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&job.resume_id)
        .bind(job.version_number)
        .bind(&job.output_filename)
        .bind(&job.resume_data)
        .bind(&job.meta_code)
        .fetch_one(&self.pool)
        .await?;

        into_job(row)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query_as::<_, GenerationRow>("SELECT * FROM generations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(into_job).transpose()
    }

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM generations GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status.parse::<JobStatus>() {
                Ok(status) => counts.add(status, count),
                Err(e) => warn!("Skipping {count} rows: {e}"),
            }
        }
        Ok(counts)
    }

    async fn list_stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query_as::<_, GenerationRow>(
            r#"
            SELECT * FROM generations
            WHERE status = 'PROCESSING'
              AND updated_at < $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_job).collect()
    }
}
