use crate::domain::jobs::{Job, JobState, JobUpdate};
use crate::error::ScanError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// In-memory registry of scan jobs, one per video id.
///
/// Every access takes the single table lock for the length of a field merge;
/// readers get a cloned snapshot.
#[derive(Debug, Default)]
pub struct JobManager {
    jobs: Mutex<HashMap<String, Job>>,
}

/// Result of a finished job body: the viewer path and the scan time.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub view: String,
    pub scan_time: f64,
}

impl JobManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Job>> {
        // a panicking writer cannot leave a half-merged job behind
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a queued job, replacing any previous job with the same id.
    pub fn create(&self, id: &str) -> Job {
        let job = Job::queued(id);
        self.table().insert(id.to_string(), job.clone());
        job
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        self.table().get(id).cloned()
    }

    /// Merge `update` into the live job. Unknown ids are ignored.
    pub fn update(&self, id: &str, update: JobUpdate) {
        match self.table().get_mut(id) {
            Some(job) => job.apply(update),
            None => tracing::debug!("update for unknown job {}", id),
        }
    }

    pub fn record_progress(&self, id: &str, processed: u64, elapsed: Duration) {
        if let Some(job) = self.table().get_mut(id) {
            job.record_progress(processed, elapsed);
        }
    }

    /// Drive `work` to a terminal state. Errors and panics in the job body are
    /// recorded on the job and never propagate to the caller.
    pub async fn run<F>(&self, id: &str, work: F) -> JobState
    where
        F: Future<Output = Result<Completion, ScanError>> + Send + 'static,
    {
        self.update(
            id,
            JobUpdate {
                state: Some(JobState::Processing),
                ..JobUpdate::stage("starting")
            },
        );
        tracing::info!("job {} started", id);

        let outcome = match tokio::spawn(work).await {
            Ok(result) => result,
            Err(e) => Err(ScanError::from(e)),
        };

        match outcome {
            Ok(done) => {
                tracing::info!("job {} done in {:.1}s", id, done.scan_time);
                self.update(
                    id,
                    JobUpdate {
                        state: Some(JobState::Done),
                        percent: Some(100.0),
                        eta: Some(0.0),
                        view: Some(done.view),
                        scan_time: Some(done.scan_time),
                        ..JobUpdate::stage("done")
                    },
                );
                JobState::Done
            }
            Err(e) => {
                tracing::error!("job {} failed: {}", id, e);
                self.update(
                    id,
                    JobUpdate {
                        state: Some(JobState::Error),
                        error: Some(e.to_string()),
                        ..JobUpdate::stage("error")
                    },
                );
                JobState::Error
            }
        }
    }

    /// Fire-and-forget variant of [`JobManager::run`].
    pub fn spawn<F>(self: &Arc<Self>, id: String, work: F) -> tokio::task::JoinHandle<JobState>
    where
        F: Future<Output = Result<Completion, ScanError>> + Send + 'static,
    {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run(&id, work).await })
    }
}
