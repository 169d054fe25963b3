//! Single active job ownership for a host.

use super::job::{BatchJob, JobError, JobEvents, JobRequest};
use super::types::{JobPhase, JobTotals};

/// Holds at most one batch job on behalf of a host.
///
/// Submitting while the held job is still running is rejected rather than
/// queued.
#[derive(Default)]
pub struct JobSlot {
    active: Option<BatchJob>,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a job for `request` and return its event stream.
    pub fn submit(&mut self, request: JobRequest) -> Result<JobEvents, JobError> {
        if self.phase().is_some_and(|p| p.is_active()) {
            return Err(JobError::AlreadyRunning);
        }

        let mut job = BatchJob::new(request);
        let events = job.start()?;
        self.active = Some(job);
        Ok(events)
    }

    /// Phase of the held job, if any.
    pub fn phase(&self) -> Option<JobPhase> {
        self.active.as_ref().map(BatchJob::phase)
    }

    pub fn is_busy(&self) -> bool {
        self.phase().is_some_and(|p| p.is_active())
    }

    /// Request cancellation of the held job. Returns false if the slot is empty.
    pub fn cancel(&self) -> bool {
        match &self.active {
            Some(job) => {
                job.request_cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for the held job to finish on its own.
    pub async fn finish(&mut self) -> Result<Option<JobTotals>, JobError> {
        match self.active.take() {
            Some(job) => job.wait().await.map(Some),
            None => Ok(None),
        }
    }

    /// Cancel the held job and wait until its worker has exited.
    ///
    /// After this returns no background work is writing output files.
    pub async fn shutdown(&mut self) -> Result<Option<JobTotals>, JobError> {
        let Some(job) = self.active.take() else {
            return Ok(None);
        };

        if job.phase().is_active() {
            tracing::info!("Cancelling active batch job for shutdown");
        }
        job.request_cancel();
        job.wait().await.map(Some)
    }
}
