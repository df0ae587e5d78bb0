use crate::status;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Server-side state of a background job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    PartiallyCompleted,
    Cancelled,
    /// Status string this client does not know; never terminal
    Unknown(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::PartiallyCompleted => "partially_completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Unknown(raw) => raw,
        }
    }

    /// No further progress will be reported once a job is in one of these states
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::PartiallyCompleted
                | JobStatus::Cancelled
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl From<&str> for JobStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => JobStatus::Pending,
            "processing" | "running" | "in_progress" => JobStatus::Processing,
            "completed" | "complete" | "succeeded" => JobStatus::Completed,
            "failed" | "error" => JobStatus::Failed,
            "partially_completed" | "partial" => JobStatus::PartiallyCompleted,
            "cancelled" | "canceled" => JobStatus::Cancelled,
            _ => JobStatus::Unknown(raw.to_string()),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(JobStatus::from(raw.as_str()))
    }
}

/// Progress snapshot of a job, as returned by the status endpoint
///
/// The client only ever reads these. `processed == succeeded + failed + skipped`
/// is expected but not guaranteed by the server; see [`ProcessingJob::counts_consistent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    #[serde(default, alias = "id")]
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, alias = "total_files")]
    pub total: u64,
    #[serde(default, alias = "processed_files")]
    pub processed: u64,
    #[serde(default, alias = "successful_files", alias = "successful")]
    pub succeeded: u64,
    #[serde(default, alias = "failed_files")]
    pub failed: u64,
    #[serde(default, alias = "skipped_files")]
    pub skipped: u64,
    #[serde(default)]
    pub current_file: Option<String>,
    /// Seconds
    #[serde(default)]
    pub estimated_time_remaining: Option<f64>,
    #[serde(default)]
    pub progress_percentage: Option<f64>,
    /// Failure reason supplied by the server
    #[serde(default, alias = "error_message")]
    pub error: Option<String>,
}

impl ProcessingJob {
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            total: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            current_file: None,
            estimated_time_remaining: None,
            progress_percentage: None,
            error: None,
        }
    }

    /// Server-supplied percentage clamped to `0..=100`, or derived from the counts
    pub fn percentage(&self) -> f64 {
        match self.progress_percentage {
            Some(p) if p.is_finite() => p.clamp(0.0, 100.0),
            _ => status::progress_percentage(self.processed, self.total),
        }
    }

    pub fn counts_consistent(&self) -> bool {
        self.succeeded
            .checked_add(self.failed)
            .and_then(|sum| sum.checked_add(self.skipped))
            == Some(self.processed)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_set() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::PartiallyCompleted.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Unknown("paused".into()).is_terminal());
    }

    #[test]
    fn test_status_aliases_and_unknown() {
        assert_eq!(JobStatus::from("canceled"), JobStatus::Cancelled);
        assert_eq!(JobStatus::from("RUNNING"), JobStatus::Processing);
        assert_eq!(JobStatus::from("paused"), JobStatus::Unknown("paused".into()));
        assert_eq!(JobStatus::Unknown("paused".into()).to_string(), "paused");
    }

    #[test]
    fn test_deserialize_snapshot() {
        let job: ProcessingJob = serde_json::from_str(
            r#"{
                "job_id": "j-1",
                "status": "processing",
                "total": 10,
                "processed": 4,
                "succeeded": 3,
                "failed": 1,
                "skipped": 0,
                "current_file": "brief.pdf",
                "estimated_time_remaining": 42.5,
                "progress_percentage": 40.0
            }"#,
        )
        .unwrap();
        assert_eq!(job.job_id, "j-1");
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.current_file.as_deref(), Some("brief.pdf"));
        assert_eq!(job.estimated_time_remaining, Some(42.5));
        assert!(job.counts_consistent());
        assert_eq!(job.percentage(), 40.0);
    }

    #[test]
    fn test_deserialize_sparse_snapshot_with_aliases() {
        let job: ProcessingJob = serde_json::from_str(
            r#"{"id":"j-2","status":"partially_completed","total_files":4,"processed_files":4,
                "successful_files":2,"failed_files":1,"skipped_files":1,"current_file":null}"#,
        )
        .unwrap();
        assert_eq!(job.job_id, "j-2");
        assert_eq!(job.status, JobStatus::PartiallyCompleted);
        assert_eq!(job.succeeded, 2);
        assert!(job.counts_consistent());
        assert_eq!(job.percentage(), 100.0);
    }

    #[test]
    fn test_inconsistent_counts_are_tolerated() {
        let mut job = ProcessingJob::new("j-3", JobStatus::Processing);
        job.processed = 5;
        job.succeeded = 1;
        assert!(!job.counts_consistent());
        job.total = 10;
        assert_eq!(job.percentage(), 50.0);
    }

    #[test]
    fn test_server_percentage_is_clamped() {
        let mut job = ProcessingJob::new("j-4", JobStatus::Processing);
        job.progress_percentage = Some(140.0);
        assert_eq!(job.percentage(), 100.0);
        job.progress_percentage = Some(f64::NAN);
        assert_eq!(job.percentage(), 0.0);
    }
}
