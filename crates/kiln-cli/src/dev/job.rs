//! Build jobs and the status events they emit.

use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use kiln_config::PipelineId;
use serde::Serialize;

/// Why a job was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildReason {
    Initial,
    FileChanged(PathBuf),
    ManualTrigger,
}

impl fmt::Display for BuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildReason::Initial => f.write_str("initial build"),
            BuildReason::FileChanged(path) => write!(f, "{} changed", path.display()),
            BuildReason::ManualTrigger => f.write_str("manual trigger"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        })
    }
}

/// One unit of work for one pipeline.
///
/// A failed job stays visible until the next job for the same pipeline
/// replaces it.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub pipeline_id: PipelineId,
    pub reason: BuildReason,
    pub status: JobStatus,
    /// Set when the job starts running
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub error: Option<String>,
}

impl BuildJob {
    pub fn new(pipeline_id: PipelineId, reason: BuildReason) -> Self {
        Self {
            pipeline_id,
            reason,
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Instant::now());
    }

    pub fn succeed(&mut self) {
        self.status = JobStatus::Succeeded;
        self.finished_at = Some(Instant::now());
    }

    pub fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Instant::now());
        self.error = Some(error);
    }

    /// Wall time of a finished job.
    pub fn duration(&self) -> Option<std::time::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    pub fn event(&self) -> StatusEvent {
        StatusEvent {
            pipeline_id: self.pipeline_id.clone(),
            status: self.status,
            error: self.error.clone(),
        }
    }
}

/// Broadcast on every job state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub pipeline_id: PipelineId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
