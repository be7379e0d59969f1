use serde::Serialize;

use drmsession::{ControlAction, JobId, JobOutcome, JobStatus, Version};

pub mod cli;
pub mod json;

#[derive(clap::ValueEnum, Clone)]
pub enum Outputs {
    /// Human readable tables
    CLI,
    /// One JSON document per command
    JSON,
}

#[derive(Serialize, Debug, Clone)]
pub struct SessionInfo {
    pub drm_system: String,
    pub implementation: String,
    pub version: Version,
    pub contact: String,
    pub system_info: String,
}

pub trait Output {
    fn print_job_submitted(&self, job_ids: &[JobId]);
    fn print_job_status(&self, statuses: &[(JobId, JobStatus)]);
    fn print_job_outcomes(&self, outcomes: &[JobOutcome]);
    fn print_control_applied(&self, action: ControlAction, job_ids: &[JobId]);
    /// All given jobs finished, used by waiting that does not collect outcomes.
    fn print_jobs_finished(&self, job_ids: &[JobId], disposed: bool);
    fn print_session_info(&self, info: &SessionInfo);

    fn print_error(&self, error: anyhow::Error);
}

/// Name of the way a job ended, e.g. `exited`.
pub fn termination_name(outcome: &JobOutcome) -> &'static str {
    if outcome.has_exited() {
        "exited"
    } else if outcome.was_aborted() {
        "aborted"
    } else {
        "signaled"
    }
}
