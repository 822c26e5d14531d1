use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job types the background pipeline has handlers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    ScanCollection,
    GenerateThumbnails,
    GenerateCache,
    CleanupCache,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScanCollection => "scanCollection",
            Self::GenerateThumbnails => "generateThumbnails",
            Self::GenerateCache => "generateCache",
            Self::CleanupCache => "cleanupCache",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scanCollection" => Some(Self::ScanCollection),
            "generateThumbnails" => Some(Self::GenerateThumbnails),
            "generateCache" => Some(Self::GenerateCache),
            "cleanupCache" => Some(Self::CleanupCache),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Durable record of one unit of background work.
///
/// Lifecycle: Pending → Running → {Completed | Failed | Cancelled}.
/// `started_at` is set exactly when the job enters Running; `completed_at`
/// exactly when it enters a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundJob {
    pub id: Uuid,
    pub job_type: JobKind,
    pub parameters: serde_json::Value,
    pub status: JobStatus,
    pub progress_current: u64,
    pub progress_total: u64,
    pub result_message: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BackgroundJob {
    pub fn new(job_type: JobKind, parameters: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            parameters,
            status: JobStatus::Pending,
            progress_current: 0,
            progress_total: 0,
            result_message: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_round_trip() {
        for kind in [
            JobKind::ScanCollection,
            JobKind::GenerateThumbnails,
            JobKind::GenerateCache,
            JobKind::CleanupCache,
        ] {
            assert_eq!(JobKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::parse("defragmentMoon"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }
}
