//! In-memory lifecycle tracking for synthesis jobs.
//!
//! Every job moves `Pending → Processing → Completed | Failed`. Both end
//! states are terminal; any other move is refused with
//! [`TtsError::InvalidTransition`]. Entries are never evicted and do not
//! survive a restart.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result, TtsError};
use crate::voices::VoiceSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn can_become(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Payload of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub wav_url: String,
    pub mp3_url: String,
    /// The submitted text, echoed back
    pub text: String,
}

/// Why a job ended in [`JobStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TtsError> for JobFailure {
    fn from(e: &TtsError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub completed_segments: usize,
    pub total_segments: usize,
}

#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub id: String,
    pub status: JobStatus,
    pub input_text: String,
    pub voice: VoiceSelection,
    pub result: Option<SynthesisOutput>,
    pub error: Option<JobFailure>,
    pub progress: Option<JobProgress>,
    /// Every status the job has held, oldest first
    pub history: Vec<(JobStatus, DateTime<Utc>)>,
}

/// What a poller sees of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub task_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SynthesisOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    pub updated_at: DateTime<Utc>,
}

impl SynthesisJob {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            task_id: self.id.clone(),
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            progress: self.progress,
            updated_at: self.updated_at(),
        }
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.history
            .last()
            .map(|(_, at)| *at)
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    jobs: RwLock<HashMap<String, SynthesisJob>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in `Pending` and return its id.
    pub fn create(&self, input_text: String, voice: VoiceSelection) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let job = SynthesisJob {
            id: id.clone(),
            status: JobStatus::Pending,
            input_text,
            voice,
            result: None,
            error: None,
            progress: None,
            history: vec![(JobStatus::Pending, Utc::now())],
        };
        self.jobs.write().insert(id.clone(), job);
        log::info!("Task {id} created");
        id
    }

    pub fn status(&self, id: &str) -> Result<JobSnapshot> {
        self.jobs
            .read()
            .get(id)
            .map(SynthesisJob::snapshot)
            .ok_or_else(|| not_found(id))
    }

    /// Full copy of a job, including its transition history.
    pub fn job(&self, id: &str) -> Result<SynthesisJob> {
        self.jobs.read().get(id).cloned().ok_or_else(|| not_found(id))
    }

    pub fn start(&self, id: &str) -> Result<()> {
        self.transition(id, JobStatus::Processing, |_| {})
    }

    /// Record segment progress of a job that is `Processing`.
    pub fn progress(
        &self,
        id: &str,
        completed_segments: usize,
        total_segments: usize,
    ) -> Result<()> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        if job.status != JobStatus::Processing {
            log::warn!("Ignoring progress for task {id} in state {}", job.status);
            return Ok(());
        }
        job.progress = Some(JobProgress {
            completed_segments,
            total_segments,
        });
        Ok(())
    }

    pub fn complete(&self, id: &str, output: SynthesisOutput) -> Result<()> {
        self.transition(id, JobStatus::Completed, |job| job.result = Some(output))
    }

    pub fn fail(&self, id: &str, error: &TtsError) -> Result<()> {
        let failure = JobFailure::from(error);
        self.transition(id, JobStatus::Failed, |job| job.error = Some(failure))
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Forget every job; later lookups of old ids fail with `NotFound`.
    pub fn clear(&self) {
        self.jobs.write().clear();
    }

    fn transition(
        &self,
        id: &str,
        next: JobStatus,
        apply: impl FnOnce(&mut SynthesisJob),
    ) -> Result<()> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(id).ok_or_else(|| not_found(id))?;

        if !job.status.can_become(next) {
            log::warn!("Refusing transition of task {id}: {} -> {next}", job.status);
            return Err(TtsError::InvalidTransition {
                id: id.to_string(),
                from: job.status,
                to: next,
            });
        }

        apply(job);
        job.status = next;
        job.history.push((next, Utc::now()));
        log::info!("Task {id} is now {next}");
        Ok(())
    }
}

fn not_found(id: &str) -> TtsError {
    TtsError::NotFound(format!("Task {id}"))
}
