use clap::Parser;

use drmsession::attributes::{
    ARGV, BLOCK_EMAIL, EMAIL, ENVIRONMENT, ERROR_PATH, HOLD_STATE, INPUT_PATH, JOB_CATEGORY,
    JOB_NAME, JOB_SUBMISSION_STATE, JOIN_FILES, NATIVE_SPECIFICATION, OUTPUT_PATH,
    REMOTE_COMMAND, START_TIME, TRANSFER_FILES, WORKING_DIRECTORY,
};
use drmsession::{BulkRange, Session, TemplateId};

use crate::arg_wrapper;
use crate::client::commands::wait::{ArgTimeout, collect_outcomes};
use crate::client::globalsettings::GlobalSettings;
use crate::client::session::{close_session, open_session};
use crate::common::parser::parse_bulk_range;

arg_wrapper!(ArgBulkRange, BulkRange, parse_bulk_range);

#[derive(Parser)]
pub struct SubmitOpts {
    /// Command and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Name of the job
    #[arg(long)]
    pub name: Option<String>,

    /// Working directory of the job
    #[arg(long)]
    pub cwd: Option<String>,

    /// Path of the file used as the standard input
    #[arg(long)]
    pub stdin: Option<String>,

    /// Path of the file that receives the standard output
    #[arg(long)]
    pub stdout: Option<String>,

    /// Path of the file that receives the standard error output
    #[arg(long)]
    pub stderr: Option<String>,

    /// Write the standard error output into the standard output file
    #[arg(long)]
    pub join: bool,

    /// Standard streams (`i`, `o`, `e`) transferred to and from the execution host
    #[arg(long)]
    pub transfer: Option<String>,

    /// Submit the job on hold
    #[arg(long)]
    pub hold: bool,

    /// Environment variable set for the job
    #[arg(long = "env", short = 'e', value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Scheduler specific submit options, passed without changes
    #[arg(long)]
    pub native: Option<String>,

    /// Job category
    #[arg(long)]
    pub category: Option<String>,

    /// Address notified about the job
    #[arg(long)]
    pub email: Vec<String>,

    /// Do not send any notification emails
    #[arg(long)]
    pub block_email: bool,

    /// Earliest time when the job may start
    #[arg(long)]
    pub start_time: Option<String>,

    /// Submit an array of jobs with indices `START-END[:STEP]`
    #[arg(long)]
    pub array: Option<ArgBulkRange>,

    /// Wait until the submitted jobs finish and print their outcomes
    #[arg(long)]
    pub wait: bool,

    /// Timeout of `--wait`
    #[arg(long, default_value = "forever", requires = "wait")]
    pub timeout: ArgTimeout,
}

fn fill_template(session: &Session, template: TemplateId, opts: &SubmitOpts) -> anyhow::Result<()> {
    let Some((program, args)) = opts.command.split_first() else {
        anyhow::bail!("No command was given");
    };
    session.set_value(template, REMOTE_COMMAND, program)?;
    session.set_values(template, ARGV, args)?;

    let scalars = [
        (JOB_NAME, &opts.name),
        (WORKING_DIRECTORY, &opts.cwd),
        (INPUT_PATH, &opts.stdin),
        (OUTPUT_PATH, &opts.stdout),
        (ERROR_PATH, &opts.stderr),
        (TRANSFER_FILES, &opts.transfer),
        (NATIVE_SPECIFICATION, &opts.native),
        (JOB_CATEGORY, &opts.category),
        (START_TIME, &opts.start_time),
    ];
    for (key, value) in scalars {
        if let Some(value) = value {
            session.set_value(template, key, value)?;
        }
    }
    if opts.join {
        session.set_value(template, JOIN_FILES, "y")?;
    }
    if opts.hold {
        session.set_value(template, JOB_SUBMISSION_STATE, HOLD_STATE)?;
    }
    if opts.block_email {
        session.set_value(template, BLOCK_EMAIL, "y")?;
    }
    if !opts.env.is_empty() {
        session.set_values(template, ENVIRONMENT, &opts.env)?;
    }
    if !opts.email.is_empty() {
        session.set_values(template, EMAIL, &opts.email)?;
    }
    Ok(())
}

async fn submit_in_session(
    gsettings: &GlobalSettings,
    session: &Session,
    opts: SubmitOpts,
) -> anyhow::Result<()> {
    let template = session.allocate_template()?;
    fill_template(session, template, &opts)?;

    let identifier = match &opts.array {
        Some(range) => {
            let range = range.get();
            session
                .run_bulk_jobs(template, range.start(), range.end(), range.step())
                .await?
        }
        None => session.run_job(template).await?,
    };
    session.delete_template(template)?;

    let job_ids = identifier.explicit_ids().unwrap_or_default();
    gsettings.printer().print_job_submitted(job_ids);

    if opts.wait {
        let outcomes = collect_outcomes(session, job_ids, opts.timeout.unpack()).await?;
        gsettings.printer().print_job_outcomes(&outcomes);
    }
    Ok(())
}

pub async fn submit_job(gsettings: &GlobalSettings, opts: SubmitOpts) -> anyhow::Result<()> {
    let session = open_session(gsettings).await?;
    let result = submit_in_session(gsettings, &session, opts).await;
    close_session(session).await;
    result
}
