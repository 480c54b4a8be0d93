//! Job Store: persistent collection of generation jobs.
//!
//! Every mutation of a job goes through the atomic primitives below; callers
//! never read-then-write. Correctness across multiple worker processes relies
//! entirely on `claim_next_pending` / `claim_by_id` being exclusive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{Job, JobUpdate, NewJob, StatusCounts};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgJobStore;

/// Notification that a job was inserted in PENDING state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertEvent {
    pub job_id: Uuid,
}

/// Live insert feed. Infinite while the connection holds; an `Err` item or
/// the end of the stream means the subscription is gone and must be reopened.
/// Delivery is at-least-once.
pub type InsertFeed = BoxStream<'static, Result<InsertEvent, StoreError>>;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically moves the oldest PENDING job to PROCESSING and returns the
    /// post-transition snapshot. `None` when nothing is pending.
    async fn claim_next_pending(&self) -> Result<Option<Job>, StoreError>;

    /// Moves `id` from PENDING to PROCESSING only if it is still PENDING.
    /// `None` when another caller got there first (or the job is unknown).
    async fn claim_by_id(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Opens a fresh insert-notification subscription.
    async fn subscribe_inserts(&self) -> Result<InsertFeed, StoreError>;

    /// Writes a terminal update onto a PROCESSING job and refreshes
    /// `updated_at`. Any other current status is an `InvalidTransition`.
    async fn update_status(&self, id: Uuid, update: JobUpdate) -> Result<Job, StoreError>;

    async fn insert_job(&self, job: NewJob) -> Result<Job, StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError>;

    /// PROCESSING jobs whose last update is older than `older_than`.
    async fn list_stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError>;
}
