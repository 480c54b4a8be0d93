//! In-memory `JobStore` used by the worker's unit tests.
//!
//! Mirrors the PostgreSQL semantics (exclusive claims, PROCESSING-only
//! terminal updates) and adds hooks for injecting duplicate notifications and
//! subscription failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{InsertEvent, InsertFeed, JobStore};
use crate::errors::StoreError;
use crate::models::{Job, JobStatus, JobUpdate, NewJob, StatusCounts};

type FeedSender = mpsc::UnboundedSender<Result<InsertEvent, StoreError>>;

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
    subscribers: Mutex<Vec<FeedSender>>,
    transitions: Mutex<Vec<(Uuid, JobStatus, JobStatus)>>,
    failing_subscribes: AtomicUsize,
    subscribe_calls: AtomicUsize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a PENDING job with an explicit creation time, without
    /// notifying subscribers (a job that predates the worker).
    pub fn seed_pending(
        &self,
        output_filename: &str,
        resume_data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Job {
        let job = Job {
            id: Uuid::new_v4(),
            resume_id: None,
            version_number: None,
            status: JobStatus::Pending,
            output_filename: output_filename.to_string(),
            resume_data,
            meta_code: "RES".to_string(),
            drive_link: None,
            pdf_path: None,
            error_log: None,
            created_at,
            updated_at: created_at,
        };
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        job
    }

    /// Forces a job into PROCESSING as if a previous worker died mid-pipeline.
    pub fn seed_processing(&self, output_filename: &str, updated_at: DateTime<Utc>) -> Job {
        let mut job = self.seed_pending(output_filename, serde_json::json!({}), updated_at);
        job.status = JobStatus::Processing;
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        job
    }

    /// Delivers an insert notification for `job_id` to every open feed.
    pub fn notify(&self, job_id: Uuid) {
        self.broadcast(|| Ok(InsertEvent { job_id }));
    }

    /// Breaks every open feed with a transport error.
    pub fn fail_feeds(&self, message: &str) {
        self.broadcast(|| Err(StoreError::Subscription(message.to_string())));
        self.subscribers.lock().unwrap().clear();
    }

    /// Makes the next `count` subscribe attempts fail.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.failing_subscribes.store(count, Ordering::SeqCst);
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn job(&self, id: Uuid) -> Job {
        self.jobs.lock().unwrap()[&id].clone()
    }

    pub fn transitions(&self) -> Vec<(Uuid, JobStatus, JobStatus)> {
        self.transitions.lock().unwrap().clone()
    }

    fn broadcast<F>(&self, item: F)
    where
        F: Fn() -> Result<InsertEvent, StoreError>,
    {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(item()).is_ok());
    }

    fn transition(&self, job: &mut Job, to: JobStatus) {
        debug_assert!(job.status.can_transition_to(to), "{} -> {to}", job.status);
        self.transitions
            .lock()
            .unwrap()
            .push((job.id, job.status, to));
        job.status = to;
        // Strictly increasing so ordering assertions hold even within a tick.
        job.updated_at = Utc::now().max(job.updated_at + Duration::microseconds(1));
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn claim_next_pending(&self) -> Result<Option<Job>, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let next_id = jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .min_by_key(|job| (job.created_at, job.id))
            .map(|job| job.id);

        Ok(next_id.and_then(|id| jobs.get_mut(&id)).map(|job| {
            self.transition(job, JobStatus::Processing);
            job.clone()
        }))
    }

    async fn claim_by_id(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .get_mut(&id)
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| {
                self.transition(job, JobStatus::Processing);
                job.clone()
            }))
    }

    async fn subscribe_inserts(&self) -> Result<InsertFeed, StoreError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_subscribes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_subscribes.store(failing - 1, Ordering::SeqCst);
            return Err(StoreError::Subscription("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    async fn update_status(&self, id: Uuid, update: JobUpdate) -> Result<Job, StoreError> {
        let to = update.status();
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&id)
            .filter(|job| job.status == JobStatus::Processing)
            .ok_or(StoreError::InvalidTransition { id, to })?;

        match update {
            JobUpdate::Completed {
                pdf_path,
                drive_link,
            } => {
                job.pdf_path = Some(pdf_path);
                job.drive_link = drive_link;
                job.error_log = None;
            }
            JobUpdate::Failed { error_log } => {
                job.pdf_path = None;
                job.drive_link = None;
                job.error_log = Some(error_log);
            }
        }
        self.transition(job, to);
        Ok(job.clone())
    }

    async fn insert_job(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            resume_id: new_job.resume_id,
            version_number: new_job.version_number,
            status: JobStatus::Pending,
            output_filename: new_job.output_filename,
            resume_data: new_job.resume_data,
            meta_code: new_job.meta_code,
            drive_link: None,
            pdf_path: None,
            error_log: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        self.notify(job.id);
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let mut counts = StatusCounts::default();
        for job in self.jobs.lock().unwrap().values() {
            counts.add(job.status, 1);
        }
        Ok(counts)
    }

    async fn list_stale_processing(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        let mut stale: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.status == JobStatus::Processing && job.updated_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|job| job.updated_at);
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_parallel_claims_on_one_job_have_single_winner() {
        let store = Arc::new(MemoryJobStore::new());
        let job = store.seed_pending("Race", json!({}), Utc::now());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.claim_by_id(job.id).await }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.job(job.id).status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_claim_next_pending_is_oldest_first() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let newer = store.seed_pending("Newer", json!({}), now);
        let older = store.seed_pending("Older", json!({}), now - Duration::minutes(5));

        let first = store.claim_next_pending().await.unwrap().unwrap();
        let second = store.claim_next_pending().await.unwrap().unwrap();
        assert_eq!(first.id, older.id);
        assert_eq!(second.id, newer.id);
        assert_eq!(first.status, JobStatus::Processing);
        assert!(store.claim_next_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_requires_processing() {
        let store = MemoryJobStore::new();
        let job = store.seed_pending("Guard", json!({}), Utc::now());

        let err = store
            .update_status(job.id, JobUpdate::Failed { error_log: "x".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_insert_notifies_open_feeds() {
        let store = MemoryJobStore::new();
        let mut feed = store.subscribe_inserts().await.unwrap();

        let job = store
            .insert_job(NewJob::new("Live", json!({})))
            .await
            .unwrap();

        let event = feed.next().await.unwrap().unwrap();
        assert_eq!(event.job_id, job.id);
    }
}
