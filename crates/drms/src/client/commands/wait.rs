use clap::Parser;
use tokio::time::Instant;

use drmsession::{JobId, JobIdentifier, JobOutcome, Session, Timeout};

use crate::arg_wrapper;
use crate::client::globalsettings::GlobalSettings;
use crate::client::session::{close_session, open_session};
use crate::common::parser::parse_timeout;

arg_wrapper!(ArgTimeout, Timeout, parse_timeout);

#[derive(Parser)]
pub struct WaitOpts {
    /// IDs of the jobs to wait for
    #[arg(required = true)]
    pub job_ids: Vec<String>,

    /// How long to wait: `forever`, `nowait`, seconds or a duration such as `10m`
    #[arg(long, default_value = "forever")]
    pub timeout: ArgTimeout,

    /// Return after the first of the jobs finishes
    #[arg(long, conflicts_with = "sync")]
    pub any: bool,

    /// Only wait until all jobs finish, without reporting their outcomes
    #[arg(long)]
    pub sync: bool,

    /// Keep the records of finished jobs in the scheduler (only with `--sync`)
    #[arg(long, requires = "sync")]
    pub no_dispose: bool,
}

/// Time left from `timeout` measured from `start`.
fn remaining(timeout: Timeout, start: Instant) -> Timeout {
    match timeout {
        Timeout::After(duration) => match duration.checked_sub(start.elapsed()) {
            Some(left) if !left.is_zero() => Timeout::After(left),
            _ => Timeout::NoWait,
        },
        timeout => timeout,
    }
}

/// Waits for each job in turn, all of them sharing a single `timeout`.
pub async fn collect_outcomes(
    session: &Session,
    job_ids: &[JobId],
    timeout: Timeout,
) -> anyhow::Result<Vec<JobOutcome>> {
    let start = Instant::now();
    let mut outcomes = Vec::with_capacity(job_ids.len());
    for job_id in job_ids {
        let identifier = JobIdentifier::from(job_id.clone());
        outcomes.push(session.wait(&identifier, remaining(timeout, start)).await?);
    }
    Ok(outcomes)
}

async fn wait_in_session(
    gsettings: &GlobalSettings,
    session: &Session,
    opts: WaitOpts,
) -> anyhow::Result<()> {
    let job_ids: Vec<JobId> = opts.job_ids.into_iter().map(JobId::from).collect();
    session.adopt_jobs(&job_ids)?;
    let timeout = opts.timeout.unpack();

    if opts.sync {
        let identifiers: Vec<JobIdentifier> =
            job_ids.iter().cloned().map(JobIdentifier::from).collect();
        let dispose = !opts.no_dispose;
        session.synchronize(&identifiers, timeout, dispose).await?;
        gsettings.printer().print_jobs_finished(&job_ids, dispose);
    } else if opts.any {
        let outcome = session.wait(&JobIdentifier::AllOfSession, timeout).await?;
        gsettings.printer().print_job_outcomes(&[outcome]);
    } else {
        let outcomes = collect_outcomes(session, &job_ids, timeout).await?;
        gsettings.printer().print_job_outcomes(&outcomes);
    }
    Ok(())
}

pub async fn wait_for_jobs(gsettings: &GlobalSettings, opts: WaitOpts) -> anyhow::Result<()> {
    let session = open_session(gsettings).await?;
    let result = wait_in_session(gsettings, &session, opts).await;
    close_session(session).await;
    result
}
