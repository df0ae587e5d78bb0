//! Presentation helpers for job state. Pure functions, no I/O.

use crate::job::{JobStatus, ProcessingJob};

/// Placeholder for a duration the server did not supply
pub const NOT_AVAILABLE: &str = "N/A";

/// Icon family a status is rendered with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Success,
    Failure,
    InProgress,
    Warning,
}

pub fn status_label(status: &str) -> &'static str {
    match JobStatus::from(status) {
        JobStatus::Pending => "Pending",
        JobStatus::Processing => "Processing",
        JobStatus::Completed => "Completed",
        JobStatus::Failed => "Failed",
        JobStatus::PartiallyCompleted => "Partially Completed",
        JobStatus::Cancelled => "Cancelled",
        JobStatus::Unknown(_) => "Unknown",
    }
}

pub fn status_category(status: &str) -> StatusCategory {
    match JobStatus::from(status) {
        JobStatus::Completed => StatusCategory::Success,
        JobStatus::Failed => StatusCategory::Failure,
        JobStatus::Pending | JobStatus::Processing => StatusCategory::InProgress,
        JobStatus::PartiallyCompleted | JobStatus::Cancelled | JobStatus::Unknown(_) => {
            StatusCategory::Warning
        }
    }
}

/// `45s`, `3m 12s`, `2h 5m`; `N/A` for missing or nonsensical input
pub fn format_duration(seconds: Option<f64>) -> String {
    let seconds = match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => s.round() as u64,
        _ => return NOT_AVAILABLE.to_string(),
    };

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// `processed / total` as a percentage in `0..=100`; zero when there is nothing to process
pub fn progress_percentage(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (processed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// One-line summary of a snapshot, e.g. `Processing 4/10 (40%) brief.pdf, ETA 1m 5s`
pub fn progress_line(job: &ProcessingJob) -> String {
    let mut line = format!(
        "{} {}/{} ({:.0}%)",
        status_label(job.status.as_str()),
        job.processed,
        job.total,
        job.percentage()
    );
    if let Some(file) = &job.current_file {
        line.push(' ');
        line.push_str(file);
    }
    if !job.is_terminal() {
        line.push_str(", ETA ");
        line.push_str(&format_duration(job.estimated_time_remaining));
    }
    line
}
