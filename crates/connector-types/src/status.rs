use serde::{Deserialize, Serialize};

/// Connector lifecycle status (§3, §4.5). Serialized as the lower-case of
/// the variant name, matching the BYOC protocol's `e2str`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Created,
    NeedsConfiguration,
    Configured,
    Connected,
    Error,
}

impl Default for Status {
    fn default() -> Self {
        Status::Created
    }
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Created => "created",
            Status::NeedsConfiguration => "needs_configuration",
            Status::Configured => "configured",
            Status::Connected => "connected",
            Status::Error => "error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync job lifecycle status (§3, §4.4).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Canceling,
    Completed,
    Failed,
    Suspended,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Canceling => "canceling",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Suspended => "suspended",
        }
    }

    /// `completed_at` is set iff the job is in one of these two statuses
    /// (§3 invariant).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// `status ∈ {in_progress, canceling}`, the set §4.7 checks when
    /// sweeping for stuck jobs.
    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::InProgress | JobStatus::Canceling)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e2str_uses_lower_case() {
        assert_eq!(Status::NeedsConfiguration.as_str(), "needs_configuration");
        assert_eq!(JobStatus::InProgress.as_str(), "in_progress");
    }

    #[test]
    fn terminal_set_matches_spec() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(!JobStatus::Suspended.is_terminal());
    }

    #[test]
    fn running_set_matches_stuck_job_sweep() {
        assert!(JobStatus::InProgress.is_running());
        assert!(JobStatus::Canceling.is_running());
        assert!(!JobStatus::Pending.is_running());
        assert!(!JobStatus::Completed.is_running());
    }

    #[test]
    fn serializes_lower_case() {
        let s = serde_json::to_string(&Status::NeedsConfiguration).unwrap();
        assert_eq!(s, "\"needs_configuration\"");
        let s = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(s, "\"in_progress\"");
    }
}
