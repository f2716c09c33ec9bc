use connector_types::{Error, JobStatus, Result, SyncJob};
use search_client::IndexGateway;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;

/// Lifecycle object for one ingestion run (§4.4, L4): start/suspend/
/// done/failed transitions, persisted to the job-history index. Owned
/// exclusively by the orchestrator that created it until terminal (§3).
pub struct SyncJobRecord {
    job_id: String,
    gateway: IndexGateway,
    job: SyncJob,
}

impl SyncJobRecord {
    /// `start(filtering)`: creates the job document with
    /// `status=in_progress`, `created_at=now`, and the *flattened*
    /// active filtering embedded under `connector.filtering` (§3, §4.4).
    pub async fn start(connector_id: &str, raw_filtering: Option<&Value>, gateway: IndexGateway) -> Result<Self> {
        let mut job = SyncJob::new(connector_id);
        job.connector.filtering = SyncJob::transform_filtering(raw_filtering);
        job.status = JobStatus::InProgress;
        job.created_at = Some(now_rfc3339());

        let doc = serde_json::to_value(&job)?;
        let job_id = gateway.create(&doc).await?;
        job.job_id = Some(job_id.clone());

        Ok(SyncJobRecord { job_id, gateway, job })
    }

    /// Wraps an already-persisted job document without creating a new
    /// one, for resuming a job the sweep found still `pending` (§4.7
    /// step 7's third sweep case: the orchestrator crashed or restarted
    /// between `create()` and the first `mark_running()`).
    pub fn reattach(job_id: String, job: SyncJob, gateway: IndexGateway) -> Self {
        SyncJobRecord { job_id, gateway, job }
    }

    /// Moves a reattached `pending` job into `in_progress` before its
    /// bulk run starts, mirroring what `start()` does inline for a
    /// freshly created job.
    pub async fn mark_running(&mut self) -> Result<()> {
        self.job.status = JobStatus::InProgress;
        self.flush().await
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.job.status
    }

    pub fn filtering(&self) -> &Value {
        &self.job.connector.filtering
    }

    /// `done(indexed, deleted, exception=None)` (§4.4): moves to
    /// `completed` (no exception) or `failed`, sets counters,
    /// `completed_at=now`.
    pub async fn done(&mut self, indexed: u64, deleted: u64, exception: Option<String>) -> Result<()> {
        self.job.indexed_document_count = indexed;
        self.job.deleted_document_count = deleted;
        self.job.completed_at = Some(now_rfc3339());
        self.job.status = if exception.is_some() { JobStatus::Failed } else { JobStatus::Completed };
        self.job.error = exception;
        self.flush().await
    }

    pub async fn suspend(&mut self) -> Result<()> {
        self.transition(JobStatus::Suspended, None).await
    }

    pub async fn fail(&mut self, exception: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed, Some(exception.into())).await
    }

    pub async fn cancel(&mut self) -> Result<()> {
        self.transition(JobStatus::Canceling, None).await
    }

    async fn transition(&mut self, status: JobStatus, error: Option<String>) -> Result<()> {
        self.job.status = status;
        if status.is_terminal() {
            self.job.completed_at = Some(now_rfc3339());
        }
        if error.is_some() {
            self.job.error = error;
        }
        self.flush().await
    }

    async fn flush(&self) -> Result<()> {
        let doc = serde_json::to_value(&self.job)?;
        self.gateway.upsert(&self.job_id, &doc).await
    }

    /// `duration = completed_at - created_at`, or `-1` until completed
    /// (§3 invariant, §8 property 2).
    pub fn duration_secs(&self) -> f64 {
        let parse = |s: &Option<String>| s.as_deref().and_then(|s| time::OffsetDateTime::parse(s, &Rfc3339).ok());
        SyncJob::duration_secs(parse(&self.job.created_at), parse(&self.job.completed_at))
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// A job whose `connector.id` no longer matches any known connector, or
/// one stuck in a non-terminal status past `stuck_threshold` without a
/// heartbeat — both handled by the orchestrator's sweep (§4.7 step 7),
/// not here; this type only offers the classification predicate each
/// sweep needs once it already has the raw job document in hand.
pub fn is_stuck(status: JobStatus, last_seen: Option<time::OffsetDateTime>, now: time::OffsetDateTime, stuck_threshold: time::Duration) -> bool {
    status.is_running()
        && match last_seen {
            None => true,
            Some(seen) => now - seen >= stuck_threshold,
        }
}

pub fn validate_status_transition(from: JobStatus, to: JobStatus) -> Result<()> {
    if from.is_terminal() {
        return Err(Error::InvalidStatus(format!("cannot transition out of terminal status {from}")));
    }
    let _ = to;
    Ok(())
}
