//! Live Watcher: reacts to newly inserted PENDING jobs.
//!
//! Modelled as an explicit reconnect state machine:
//!
//! ```text
//! Connecting --subscribe ok--> Streaming --event--> Streaming
//!     ^  |                        |
//!     |  +--subscribe err--+      +--feed err / feed closed / claim err--+
//!     |                    v                                             |
//!     +---- delay ---- Backoff <-----------------------------------------+
//! ```
//!
//! No terminal state: only shutdown (or a fatal store error while recording a
//! job's outcome) ends the loop.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::JobProcessor;
use crate::errors::StoreError;
use crate::store::{InsertFeed, JobStore};

pub enum WatchState {
    Connecting,
    Streaming(InsertFeed),
    Backoff(Duration),
}

impl WatchState {
    pub fn name(&self) -> &'static str {
        match self {
            WatchState::Connecting => "connecting",
            WatchState::Streaming(_) => "streaming",
            WatchState::Backoff(_) => "backoff",
        }
    }
}

pub struct Watcher {
    store: Arc<dyn JobStore>,
    processor: JobProcessor,
    backoff: Duration,
}

impl Watcher {
    pub fn new(store: Arc<dyn JobStore>, processor: JobProcessor, backoff: Duration) -> Self {
        Self {
            store,
            processor,
            backoff,
        }
    }

    pub async fn run(&self, shutdown: &CancellationToken) -> Result<(), StoreError> {
        info!("Watching for live inserts...");
        let mut state = WatchState::Connecting;

        while let Some(next) = self.step(state, shutdown).await? {
            state = next;
        }

        info!("Watcher stopped");
        Ok(())
    }

    /// Advances the state machine by one transition. `None` means shutdown.
    pub async fn step(
        &self,
        state: WatchState,
        shutdown: &CancellationToken,
    ) -> Result<Option<WatchState>, StoreError> {
        if shutdown.is_cancelled() {
            return Ok(None);
        }

        let next = match state {
            WatchState::Connecting => match self.store.subscribe_inserts().await {
                Ok(feed) => WatchState::Streaming(feed),
                Err(e) => {
                    warn!("Subscribe failed (sleeping {:?}): {e}", self.backoff);
                    WatchState::Backoff(self.backoff)
                }
            },

            WatchState::Backoff(delay) => {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(delay) => WatchState::Connecting,
                }
            }

            WatchState::Streaming(mut feed) => {
                let item = tokio::select! {
                    _ = shutdown.cancelled() => return Ok(None),
                    item = feed.next() => item,
                };

                match item {
                    Some(Ok(event)) => match self.store.claim_by_id(event.job_id).await {
                        Ok(Some(job)) => {
                            info!("New job arrived: {}", job.output_filename);
                            // Failing to record the outcome is fatal, unlike claim errors.
                            self.processor.process(&job).await?;
                            info!("Resuming watch...");
                            WatchState::Streaming(feed)
                        }
                        Ok(None) => {
                            debug!("Job {} already claimed; skipping", event.job_id);
                            WatchState::Streaming(feed)
                        }
                        Err(e) => {
                            warn!(
                                "Claim of job {} failed (sleeping {:?}): {e}",
                                event.job_id, self.backoff
                            );
                            WatchState::Backoff(self.backoff)
                        }
                    },
                    Some(Err(e)) => {
                        warn!("Change feed error (sleeping {:?}): {e}", self.backoff);
                        WatchState::Backoff(self.backoff)
                    }
                    None => {
                        warn!("Change feed closed (sleeping {:?})", self.backoff);
                        WatchState::Backoff(self.backoff)
                    }
                }
            }
        };

        debug!("Watcher -> {}", next.name());
        Ok(Some(next))
    }
}
