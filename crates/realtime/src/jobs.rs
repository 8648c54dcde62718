//! Job-scoped subscriptions layered on the generic channel.
//!
//! `subscribe_job` asks the server to start forwarding a job's lifecycle
//! events to this client. The channel itself is not partitioned by job:
//! forwarded events go through normal dispatch, and handlers compare
//! [`ServerMessage::job_id`] themselves. [`JobWatch`] packages that
//! comparison for the common single-job case.

use jobwire_core::{ClientCommand, JobId, ServerMessage, Topic};

use crate::client::RealtimeClient;
use crate::registry::Subscription;

impl RealtimeClient {
    /// Ask the server to forward events for `job_id`. Returns `false` if not
    /// connected.
    pub fn subscribe_to_job(&self, job_id: impl Into<JobId>) -> bool {
        self.send(&ClientCommand::subscribe_job(job_id))
    }

    /// Ask the server to stop forwarding events for `job_id`. Returns
    /// `false` if not connected.
    pub fn unsubscribe_from_job(&self, job_id: impl Into<JobId>) -> bool {
        self.send(&ClientCommand::unsubscribe_job(job_id))
    }

    /// Subscribe to `job_id` and route only that job's messages to
    /// `handler`.
    ///
    /// The handler is registered before the `subscribe_job` command goes
    /// out, so the acknowledgement is never missed. If the client is not
    /// connected the handler is still registered and will see broadcasts
    /// such as `job_status_update` for the job; call
    /// [`subscribe_to_job`](Self::subscribe_to_job) again once connected.
    pub fn watch_job<F>(&self, job_id: impl Into<JobId>, handler: F) -> JobWatch
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        let job_id: JobId = job_id.into();
        let wanted = job_id.clone();
        let subscription = self.subscribe(Topic::Any, move |message: &ServerMessage| {
            if message.job_id() == Some(wanted.as_str()) {
                handler(message);
            }
        });

        if !self.subscribe_to_job(job_id.clone()) {
            tracing::warn!(job_id = %job_id, "Watching job without server-side subscription");
        }

        JobWatch {
            client: self.clone(),
            job_id,
            subscription,
        }
    }
}

/// A handler bound to one job. Stop it with [`JobWatch::stop`].
#[must_use = "dropping a JobWatch leaves its handler registered"]
pub struct JobWatch {
    client: RealtimeClient,
    job_id: JobId,
    subscription: Subscription,
}

impl JobWatch {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Remove the handler and ask the server to stop forwarding the job.
    pub fn stop(self) {
        self.subscription.unsubscribe();
        self.client.unsubscribe_from_job(self.job_id);
    }
}
