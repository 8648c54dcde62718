//! Human-readable logging of job events, plus tracking of which watched
//! jobs are still running.

use std::collections::HashSet;
use std::sync::Mutex;

use jobwire_core::{JobId, ServerMessage};

/// Log one inbound message at a level matching its significance.
pub fn log_message(message: &ServerMessage) {
    match message {
        ServerMessage::JobStarted(d) => {
            tracing::info!(job_id = %d.job_id, url = d.url.as_deref(), "Job started");
        }
        ServerMessage::JobProgress(d) => {
            tracing::info!(
                job_id = %d.job_id,
                stage = d.stage.as_deref(),
                progress = d.progress,
                message = d.message.as_deref(),
                "Job progress",
            );
        }
        ServerMessage::JobCompleted(d) => {
            tracing::info!(
                job_id = %d.job_id,
                data_count = d.data_count,
                results_available = d.results_available,
                "Job completed",
            );
        }
        ServerMessage::JobFailed(d) => {
            tracing::error!(job_id = %d.job_id, error = d.error.as_deref(), "Job failed");
        }
        ServerMessage::JobCancelled(d) => {
            tracing::warn!(job_id = %d.job_id, "Job cancelled");
        }
        ServerMessage::JobStatusUpdate(d) => {
            tracing::info!(
                job_id = %d.job_id,
                status = d.status.map(|s| s.as_str()),
                error = d.error_message.as_deref(),
                "Job status changed",
            );
        }
        ServerMessage::Subscribed(ack) | ServerMessage::Unsubscribed(ack) => {
            tracing::debug!(
                kind = %message.kind(),
                job_id = ack.job_id.as_deref(),
                message = ack.message.as_deref(),
                "Subscription acknowledged",
            );
        }
        ServerMessage::Error(e) => {
            tracing::warn!(message = e.message.as_deref(), "Server reported an error");
        }
        ServerMessage::Pong(_) => {
            tracing::trace!("Pong");
        }
    }
}

/// Watched jobs that have not reached a terminal event yet.
#[derive(Debug)]
pub struct Outstanding {
    jobs: Mutex<HashSet<JobId>>,
}

impl Outstanding {
    pub fn new(job_ids: &[JobId]) -> Self {
        Self {
            jobs: Mutex::new(job_ids.iter().cloned().collect()),
        }
    }

    /// Record `message`; returns `true` if it finished the last watched job.
    pub fn observe(&self, message: &ServerMessage) -> bool {
        if !message.is_terminal() {
            return false;
        }
        let Some(job_id) = message.job_id() else {
            return false;
        };
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.remove(job_id) && jobs.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
