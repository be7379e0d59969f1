use cli_table::format::Separator;
use cli_table::{Cell, CellStruct, Color, ColorChoice, Style, Table, TableStruct, print_stdout};
use colored::Colorize;

use drmsession::{ControlAction, JobId, JobOutcome, JobStatus};

use crate::client::output::{Output, SessionInfo, termination_name};

pub struct CliOutput {
    color_policy: ColorChoice,
}

impl CliOutput {
    pub fn new(color_policy: ColorChoice) -> CliOutput {
        CliOutput { color_policy }
    }

    fn print_vertical_table(&self, rows: Vec<Vec<CellStruct>>) {
        let table = rows.table().separator(
            Separator::builder()
                .column(Some(Default::default()))
                .build(),
        );
        self.print_table(table);
    }

    fn print_horizontal_table(&self, rows: Vec<Vec<CellStruct>>, header: Vec<CellStruct>) {
        let table = rows
            .table()
            .separator(
                Separator::builder()
                    .title(Some(Default::default()))
                    .column(Some(Default::default()))
                    .build(),
            )
            .title(header);
        self.print_table(table);
    }

    fn print_table(&self, table: TableStruct) {
        let table = table.color_choice(self.color_policy);
        if let Err(e) = print_stdout(table) {
            log::error!("Cannot print table to stdout: {e:?}");
        }
    }
}

fn status_cell(status: JobStatus) -> CellStruct {
    let color = match status {
        JobStatus::Undetermined => None,
        JobStatus::QueuedActive => Some(Color::Yellow),
        JobStatus::SystemOnHold | JobStatus::UserOnHold | JobStatus::UserSystemOnHold => {
            Some(Color::Magenta)
        }
        JobStatus::Running => Some(Color::Blue),
        JobStatus::SystemSuspended | JobStatus::UserSuspended => Some(Color::Cyan),
        JobStatus::Done => Some(Color::Green),
        JobStatus::Failed => Some(Color::Red),
    };
    status.name().cell().foreground_color(color)
}

fn header(names: &[&str]) -> Vec<CellStruct> {
    names.iter().map(|name| name.cell().bold(true)).collect()
}

fn format_usage(outcome: &JobOutcome) -> String {
    let mut usage: Vec<String> = outcome
        .resource_usage
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    usage.sort_unstable();
    usage.join(", ")
}

fn outcome_row(outcome: &JobOutcome) -> Vec<CellStruct> {
    let result = termination_name(outcome).cell();
    let result = if outcome.is_success() {
        result.foreground_color(Some(Color::Green))
    } else {
        result.foreground_color(Some(Color::Red))
    };
    vec![
        outcome.job_id.as_str().cell(),
        result,
        outcome
            .exit_code()
            .map(|code| code.to_string())
            .unwrap_or_default()
            .cell(),
        outcome.signal().unwrap_or_default().cell(),
        if outcome.terminated_by_request { "yes" } else { "no" }.cell(),
        format_usage(outcome).cell(),
    ]
}

impl Output for CliOutput {
    fn print_job_submitted(&self, job_ids: &[JobId]) {
        match job_ids {
            [job_id] => println!("Job submitted {}, job ID: {job_id}", "successfully".green()),
            _ => println!(
                "Array of {} jobs submitted {}, job IDs: {}",
                job_ids.len(),
                "successfully".green(),
                job_ids
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    fn print_job_status(&self, statuses: &[(JobId, JobStatus)]) {
        let rows = statuses
            .iter()
            .map(|(job_id, status)| vec![job_id.as_str().cell(), status_cell(*status)])
            .collect();
        self.print_horizontal_table(rows, header(&["ID", "State"]));
    }

    fn print_job_outcomes(&self, outcomes: &[JobOutcome]) {
        let rows = outcomes.iter().map(outcome_row).collect();
        self.print_horizontal_table(
            rows,
            header(&["ID", "Result", "Exit code", "Signal", "Terminated", "Usage"]),
        );
    }

    fn print_control_applied(&self, action: ControlAction, job_ids: &[JobId]) {
        println!(
            "Action {} applied to {} job(s)",
            action.name().bold(),
            job_ids.len()
        );
    }

    fn print_jobs_finished(&self, job_ids: &[JobId], disposed: bool) {
        let suffix = if disposed { ", their records were disposed" } else { "" };
        println!("{} job(s) {}{suffix}", job_ids.len(), "finished".green());
    }

    fn print_session_info(&self, info: &SessionInfo) {
        let rows = vec![
            vec!["DRM system".cell().bold(true), info.drm_system.as_str().cell()],
            vec![
                "Implementation".cell().bold(true),
                info.implementation.as_str().cell(),
            ],
            vec!["Version".cell().bold(true), info.version.to_string().cell()],
            vec!["Contact".cell().bold(true), info.contact.as_str().cell()],
            vec![
                "System info".cell().bold(true),
                info.system_info.as_str().cell(),
            ],
        ];
        self.print_vertical_table(rows);
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{}: {error:?}", "Error".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drmsession::Termination;

    #[test]
    fn test_format_usage_is_sorted() {
        let mut outcome = JobOutcome::new(JobId::new("1"), Termination::Exited { code: 0 });
        outcome
            .resource_usage
            .insert("wallclock".to_string(), "12".to_string());
        outcome
            .resource_usage
            .insert("cpu".to_string(), "3".to_string());
        assert_eq!(format_usage(&outcome), "cpu=3, wallclock=12");
    }

    #[test]
    fn test_outcome_row_keeps_outcome() {
        let outcomes = vec![
            JobOutcome::exited(JobId::new("1"), 0),
            JobOutcome::new(JobId::new("2"), Termination::Aborted),
        ];
        let rows: Vec<Vec<CellStruct>> = outcomes.iter().map(outcome_row).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.len() == 6));
        assert_eq!(outcomes[1].job_id, JobId::new("2"));
    }
}
