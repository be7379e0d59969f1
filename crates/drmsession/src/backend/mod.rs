pub mod memory;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::attributes::AttributeStore;
use crate::common::error::DrmsError;
use crate::contact::ContactString;
use crate::jobid::{BulkRange, JobId};
use crate::outcome::JobOutcome;
use crate::status::StatusCode;

pub type BackendFuture<T> = Pin<Box<dyn Future<Output = crate::Result<T>> + Send>>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    Suspend,
    Resume,
    Hold,
    Release,
    Terminate,
}

impl ControlAction {
    pub fn name(self) -> &'static str {
        match self {
            ControlAction::Suspend => "suspend",
            ControlAction::Resume => "resume",
            ControlAction::Hold => "hold",
            ControlAction::Release => "release",
            ControlAction::Terminate => "terminate",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControlAction {
    type Err = DrmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "suspend" => Ok(ControlAction::Suspend),
            "resume" => Ok(ControlAction::Resume),
            "hold" => Ok(ControlAction::Hold),
            "release" => Ok(ControlAction::Release),
            "terminate" => Ok(ControlAction::Terminate),
            _ => Err(DrmsError::InvalidArgument(format!(
                "unknown control action `{s}`"
            ))),
        }
    }
}

/// Handler that communicates with a scheduler (e.g. Condor or a simulated cluster).
///
/// All returned futures own their data, so they can be awaited after the session lock
/// is released. Implementations report:
/// - unknown or reaped job ids as [`DrmsError::NotFound`],
/// - a refused contact as [`DrmsError::ConnectionError`],
/// - a refused template as [`DrmsError::SubmissionRejected`],
/// - malformed scheduler responses as [`DrmsError::BackendProtocolError`].
pub trait SchedulerBackend: Send + Sync {
    /// Name of the resource manager, e.g. `Condor`.
    fn drm_system(&self) -> String;

    fn connect(&self, contact: &ContactString) -> BackendFuture<()>;

    fn disconnect(&self) -> BackendFuture<()>;

    /// Submit one job described by an attribute snapshot.
    fn submit(&self, attributes: AttributeStore) -> BackendFuture<JobId>;

    /// Submit an array job. Returns one job id per index of `range`, in index order.
    fn submit_bulk(&self, attributes: AttributeStore, range: BulkRange)
    -> BackendFuture<Vec<JobId>>;

    /// Current status code of a job. Never blocks on the job itself.
    fn query_status(&self, job_id: &JobId) -> BackendFuture<StatusCode>;

    /// Apply a control action. Controlling a job that already finished succeeds without
    /// doing anything.
    fn control(&self, job_id: &JobId, action: ControlAction) -> BackendFuture<()>;

    /// Outcomes of those jobs from `job_ids` that are already terminal.
    /// Performs a single check and never waits for jobs to finish. Fails with NotFound
    /// when any of the jobs is unknown or already reaped.
    fn poll_outcomes(&self, job_ids: &[JobId]) -> BackendFuture<Vec<JobOutcome>>;

    /// Forget a terminal job. Later queries of the job fail with NotFound.
    fn reap(&self, job_id: &JobId) -> BackendFuture<()>;

    fn contact_info(&self) -> BackendFuture<String>;

    fn system_info(&self) -> BackendFuture<String>;

    /// Channel whose value changes whenever some job changes its state.
    /// Waiting operations use it to wake up before their next polling tick.
    fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}
