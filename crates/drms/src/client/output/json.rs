use serde_json::{Value, json};

use drmsession::{ControlAction, JobId, JobOutcome, JobStatus};

use crate::client::output::{Output, SessionInfo, termination_name};

#[derive(Default)]
pub struct JsonOutput;

impl JsonOutput {
    fn print(&self, data: Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string())
        );
    }
}

fn format_outcome(outcome: &JobOutcome) -> Value {
    json!({
        "id": outcome.job_id,
        "result": termination_name(outcome),
        "exit_code": outcome.exit_code(),
        "signal": outcome.signal(),
        "termination": outcome.termination,
        "terminated_by_request": outcome.terminated_by_request,
        "resource_usage": outcome.resource_usage,
    })
}

impl Output for JsonOutput {
    fn print_job_submitted(&self, job_ids: &[JobId]) {
        self.print(json!({ "ids": job_ids }));
    }

    fn print_job_status(&self, statuses: &[(JobId, JobStatus)]) {
        let statuses: Vec<Value> = statuses
            .iter()
            .map(|(job_id, status)| {
                json!({
                    "id": job_id,
                    "status": status,
                    "terminal": status.is_terminal(),
                })
            })
            .collect();
        self.print(Value::Array(statuses));
    }

    fn print_job_outcomes(&self, outcomes: &[JobOutcome]) {
        self.print(Value::Array(outcomes.iter().map(format_outcome).collect()));
    }

    fn print_control_applied(&self, action: ControlAction, job_ids: &[JobId]) {
        self.print(json!({
            "action": action.name(),
            "ids": job_ids,
        }));
    }

    fn print_jobs_finished(&self, job_ids: &[JobId], disposed: bool) {
        self.print(json!({
            "finished": job_ids,
            "disposed": disposed,
        }));
    }

    fn print_session_info(&self, info: &SessionInfo) {
        self.print(json!(info));
    }

    fn print_error(&self, error: anyhow::Error) {
        self.print(json!({ "error": format!("{error:#}") }));
    }
}
