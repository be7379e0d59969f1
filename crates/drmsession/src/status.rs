use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::DrmsError;

/// Numeric status code exchanged with scheduler backends.
pub type StatusCode = u32;

/// Lifecycle status of a job.
///
/// `Done` and `Failed` are terminal. Every other status may be left and revisited.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Undetermined,
    QueuedActive,
    SystemOnHold,
    UserOnHold,
    UserSystemOnHold,
    Running,
    SystemSuspended,
    UserSuspended,
    Done,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 10] = [
        JobStatus::Undetermined,
        JobStatus::QueuedActive,
        JobStatus::SystemOnHold,
        JobStatus::UserOnHold,
        JobStatus::UserSystemOnHold,
        JobStatus::Running,
        JobStatus::SystemSuspended,
        JobStatus::UserSuspended,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    /// Decodes a backend status code. Unknown codes are a protocol error, they are never
    /// mapped to `Undetermined`.
    pub fn from_code(code: StatusCode) -> crate::Result<JobStatus> {
        let status = match code {
            0x00 => JobStatus::Undetermined,
            0x10 => JobStatus::QueuedActive,
            0x11 => JobStatus::SystemOnHold,
            0x12 => JobStatus::UserOnHold,
            0x13 => JobStatus::UserSystemOnHold,
            0x20 => JobStatus::Running,
            0x21 => JobStatus::SystemSuspended,
            0x22 => JobStatus::UserSuspended,
            0x30 => JobStatus::Done,
            0x40 => JobStatus::Failed,
            code => {
                return Err(DrmsError::BackendProtocolError(format!(
                    "unknown job status code {code}"
                )));
            }
        };
        Ok(status)
    }

    pub fn code(self) -> StatusCode {
        match self {
            JobStatus::Undetermined => 0x00,
            JobStatus::QueuedActive => 0x10,
            JobStatus::SystemOnHold => 0x11,
            JobStatus::UserOnHold => 0x12,
            JobStatus::UserSystemOnHold => 0x13,
            JobStatus::Running => 0x20,
            JobStatus::SystemSuspended => 0x21,
            JobStatus::UserSuspended => 0x22,
            JobStatus::Done => 0x30,
            JobStatus::Failed => 0x40,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    #[inline]
    pub fn is_on_hold(self) -> bool {
        matches!(
            self,
            JobStatus::SystemOnHold | JobStatus::UserOnHold | JobStatus::UserSystemOnHold
        )
    }

    #[inline]
    pub fn is_suspended(self) -> bool {
        matches!(self, JobStatus::SystemSuspended | JobStatus::UserSuspended)
    }

    pub fn name(self) -> &'static str {
        match self {
            JobStatus::Undetermined => "undetermined",
            JobStatus::QueuedActive => "queued",
            JobStatus::SystemOnHold => "system-hold",
            JobStatus::UserOnHold => "user-hold",
            JobStatus::UserSystemOnHold => "user-system-hold",
            JobStatus::Running => "running",
            JobStatus::SystemSuspended => "system-suspended",
            JobStatus::UserSuspended => "user-suspended",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
