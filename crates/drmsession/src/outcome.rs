use serde::{Deserialize, Serialize};

use crate::common::Map;
use crate::jobid::JobId;

/// How a terminal job ended.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The job program exited on its own.
    Exited { code: i32 },
    /// The job program was killed by a signal.
    Signaled { signal: String, core_dumped: bool },
    /// The job ended without ever running.
    Aborted,
}

/// Record of a finished job, returned once by a successful wait.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub termination: Termination,
    /// Resource usage reported by the backend, empty when not available.
    pub resource_usage: Map<String, String>,
    /// Set when the job ended because of a terminate request.
    pub terminated_by_request: bool,
}

impl JobOutcome {
    pub fn new(job_id: JobId, termination: Termination) -> Self {
        Self {
            job_id,
            termination,
            resource_usage: Map::new(),
            terminated_by_request: false,
        }
    }

    pub fn exited(job_id: JobId, code: i32) -> Self {
        Self::new(job_id, Termination::Exited { code })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited { code } => Some(code),
            _ => None,
        }
    }

    pub fn signal(&self) -> Option<&str> {
        match &self.termination {
            Termination::Signaled { signal, .. } => Some(signal),
            _ => None,
        }
    }

    #[inline]
    pub fn has_exited(&self) -> bool {
        matches!(self.termination, Termination::Exited { .. })
    }

    #[inline]
    pub fn was_aborted(&self) -> bool {
        matches!(self.termination, Termination::Aborted)
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == Some(0)
    }
}
