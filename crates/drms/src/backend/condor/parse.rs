use nom::bytes::complete::tag;
use nom::character::complete::char;
use nom::sequence::tuple;
use serde::Deserialize;

use drmsession::common::error::DrmsError;
use drmsession::outcome::{JobOutcome, Termination};
use drmsession::{JobId, JobStatus};

use crate::backend::common::signal_name;
use crate::common::parser::{NomResult, consume_all, p_u32};

/// Job ClassAd attributes requested from `condor_q` and `condor_history`.
pub const QUERY_ATTRIBUTES: &[&str] = &[
    "ClusterId",
    "ProcId",
    "JobStatus",
    "HoldReasonCode",
    "ExitCode",
    "ExitBySignal",
    "ExitSignal",
    "JobCoreDumped",
    "RemoteWallClockTime",
    "RemoteUserCpu",
    "RemoteSysCpu",
];

const CONDOR_IDLE: u32 = 1;
const CONDOR_RUNNING: u32 = 2;
const CONDOR_REMOVED: u32 = 3;
const CONDOR_COMPLETED: u32 = 4;
const CONDOR_HELD: u32 = 5;
const CONDOR_TRANSFERRING_OUTPUT: u32 = 6;
const CONDOR_SUSPENDED: u32 = 7;

const HOLD_REASON_USER: u32 = 1;
const HOLD_REASON_SUBMITTED_ON_HOLD: u32 = 15;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct JobRecord {
    pub cluster_id: u32,
    pub proc_id: u32,
    pub job_status: u32,
    #[serde(default)]
    pub hold_reason_code: Option<u32>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub exit_by_signal: Option<bool>,
    #[serde(default)]
    pub exit_signal: Option<i32>,
    #[serde(default)]
    pub job_core_dumped: Option<bool>,
    #[serde(default)]
    pub remote_wall_clock_time: Option<f64>,
    #[serde(default)]
    pub remote_user_cpu: Option<f64>,
    #[serde(default)]
    pub remote_sys_cpu: Option<f64>,
}

impl JobRecord {
    pub fn job_id(&self) -> JobId {
        JobId::new(format!("{}.{}", self.cluster_id, self.proc_id))
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self.job_status, CONDOR_REMOVED | CONDOR_COMPLETED)
    }

    /// Maps the Condor job status. `user_suspended` is set for jobs suspended through
    /// this client.
    pub fn status(&self, user_suspended: bool) -> drmsession::Result<JobStatus> {
        let status = match self.job_status {
            CONDOR_IDLE => JobStatus::QueuedActive,
            CONDOR_RUNNING | CONDOR_TRANSFERRING_OUTPUT => JobStatus::Running,
            CONDOR_REMOVED => JobStatus::Failed,
            CONDOR_COMPLETED => match self.exit_by_signal {
                Some(true) => JobStatus::Failed,
                _ => JobStatus::Done,
            },
            CONDOR_HELD => match self.hold_reason_code {
                Some(HOLD_REASON_USER | HOLD_REASON_SUBMITTED_ON_HOLD) => JobStatus::UserOnHold,
                _ => JobStatus::SystemOnHold,
            },
            CONDOR_SUSPENDED if user_suspended => JobStatus::UserSuspended,
            CONDOR_SUSPENDED => JobStatus::SystemSuspended,
            status => {
                return Err(DrmsError::BackendProtocolError(format!(
                    "unknown Condor job status {status} of job {}",
                    self.job_id()
                )));
            }
        };
        Ok(status)
    }

    /// Outcome of a terminal job, `None` while the job is still active.
    pub fn outcome(&self) -> Option<JobOutcome> {
        let termination = match self.job_status {
            CONDOR_REMOVED => Termination::Aborted,
            CONDOR_COMPLETED => match (self.exit_by_signal, self.exit_signal) {
                (Some(true), Some(signal)) => Termination::Signaled {
                    signal: signal_name(signal),
                    core_dumped: self.job_core_dumped.unwrap_or(false),
                },
                _ => Termination::Exited {
                    code: self.exit_code.unwrap_or(0),
                },
            },
            _ => return None,
        };
        let mut outcome = JobOutcome::new(self.job_id(), termination);
        outcome.terminated_by_request = self.job_status == CONDOR_REMOVED;
        if let Some(wallclock) = self.remote_wall_clock_time {
            outcome
                .resource_usage
                .insert("wallclock".to_string(), format!("{wallclock:.0}"));
        }
        if let Some(user) = self.remote_user_cpu {
            let cpu = user + self.remote_sys_cpu.unwrap_or(0.0);
            outcome
                .resource_usage
                .insert("cpu".to_string(), format!("{cpu:.0}"));
        }
        Some(outcome)
    }
}

/// Parses the JSON output of `condor_q -json` or `condor_history -json`.
/// Both tools print nothing when no job matches.
pub fn parse_job_records(output: &str) -> drmsession::Result<Vec<JobRecord>> {
    let output = output.trim();
    if output.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(output).map_err(|error| {
        DrmsError::BackendProtocolError(format!("cannot parse Condor job records: {error}"))
    })
}

/// `<count> job(s) submitted to cluster <cluster>.`
fn p_submitted(input: &str) -> NomResult<(u32, u32)> {
    let (input, (count, _, cluster, _)) = tuple((
        p_u32,
        tag(" job(s) submitted to cluster "),
        p_u32,
        char('.'),
    ))(input)?;
    Ok((input, (count, cluster)))
}

/// Finds the number of queued jobs and their cluster id in the output of `condor_submit`.
pub fn parse_submit_output(output: &str) -> drmsession::Result<(u32, u32)> {
    output
        .lines()
        .find_map(|line| consume_all(p_submitted, line.trim()).ok())
        .ok_or_else(|| {
            DrmsError::BackendProtocolError(format!(
                "unexpected condor_submit output: {}",
                output.trim()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> JobRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_submit_output() {
        let output = "Submitting job(s)...\n3 job(s) submitted to cluster 1042.\n";
        assert_eq!(parse_submit_output(output).unwrap(), (3, 1042));
        assert!(matches!(
            parse_submit_output("ERROR: Failed to connect to local queue manager"),
            Err(DrmsError::BackendProtocolError(_))
        ));
    }

    #[test]
    fn test_parse_empty_records() {
        assert!(parse_job_records("").unwrap().is_empty());
        assert!(parse_job_records("\n").unwrap().is_empty());
        assert!(parse_job_records("[").is_err());
    }

    #[test]
    fn test_parse_records() {
        let records = parse_job_records(
            r#"[
{"ClusterId": 12, "ProcId": 0, "JobStatus": 2},
{"ClusterId": 12, "ProcId": 1, "JobStatus": 5, "HoldReasonCode": 1}
]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].job_id(), JobId::new("12.0"));
        assert_eq!(records[0].status(false).unwrap(), JobStatus::Running);
        assert_eq!(records[1].status(false).unwrap(), JobStatus::UserOnHold);
    }

    #[test]
    fn test_status_mapping() {
        let held = record(r#"{"ClusterId": 1, "ProcId": 0, "JobStatus": 5, "HoldReasonCode": 13}"#);
        assert_eq!(held.status(false).unwrap(), JobStatus::SystemOnHold);

        let suspended = record(r#"{"ClusterId": 1, "ProcId": 0, "JobStatus": 7}"#);
        assert_eq!(suspended.status(true).unwrap(), JobStatus::UserSuspended);
        assert_eq!(suspended.status(false).unwrap(), JobStatus::SystemSuspended);

        let idle = record(r#"{"ClusterId": 1, "ProcId": 0, "JobStatus": 1}"#);
        assert_eq!(idle.status(false).unwrap(), JobStatus::QueuedActive);
        assert!(idle.outcome().is_none());

        let unknown = record(r#"{"ClusterId": 1, "ProcId": 0, "JobStatus": 9}"#);
        assert!(matches!(
            unknown.status(false),
            Err(DrmsError::BackendProtocolError(_))
        ));
    }

    #[test]
    fn test_completed_outcome() {
        let completed = record(
            r#"{"ClusterId": 4, "ProcId": 2, "JobStatus": 4, "ExitCode": 3,
                "RemoteWallClockTime": 61.0, "RemoteUserCpu": 10.0, "RemoteSysCpu": 2.0}"#,
        );
        assert_eq!(completed.status(false).unwrap(), JobStatus::Done);
        let outcome = completed.outcome().unwrap();
        assert_eq!(outcome.job_id, JobId::new("4.2"));
        assert_eq!(outcome.exit_code(), Some(3));
        assert!(!outcome.terminated_by_request);
        assert_eq!(outcome.resource_usage["wallclock"], "61");
        assert_eq!(outcome.resource_usage["cpu"], "12");
    }

    #[test]
    fn test_signaled_outcome() {
        let signaled = record(
            r#"{"ClusterId": 4, "ProcId": 0, "JobStatus": 4, "ExitBySignal": true,
                "ExitSignal": 11, "JobCoreDumped": true}"#,
        );
        assert_eq!(signaled.status(false).unwrap(), JobStatus::Failed);
        assert_eq!(
            signaled.outcome().unwrap().termination,
            Termination::Signaled {
                signal: "SIGSEGV".to_string(),
                core_dumped: true
            }
        );
    }

    #[test]
    fn test_removed_outcome() {
        let removed = record(r#"{"ClusterId": 4, "ProcId": 0, "JobStatus": 3}"#);
        assert_eq!(removed.status(false).unwrap(), JobStatus::Failed);
        let outcome = removed.outcome().unwrap();
        assert!(outcome.was_aborted());
        assert!(outcome.terminated_by_request);
    }
}
