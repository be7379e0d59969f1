use clap::Parser;

use drmsession::{JobId, Session};

use crate::client::globalsettings::GlobalSettings;
use crate::client::session::{close_session, open_session};

#[derive(Parser)]
pub struct StatusOpts {
    /// IDs of the jobs
    #[arg(required = true)]
    pub job_ids: Vec<String>,
}

async fn status_in_session(
    gsettings: &GlobalSettings,
    session: &Session,
    opts: StatusOpts,
) -> anyhow::Result<()> {
    let mut statuses = Vec::with_capacity(opts.job_ids.len());
    for job_id in opts.job_ids.into_iter().map(JobId::from) {
        let status = session.job_status(&job_id).await?;
        statuses.push((job_id, status));
    }
    gsettings.printer().print_job_status(&statuses);
    Ok(())
}

pub async fn output_job_status(gsettings: &GlobalSettings, opts: StatusOpts) -> anyhow::Result<()> {
    let session = open_session(gsettings).await?;
    let result = status_in_session(gsettings, &session, opts).await;
    close_session(session).await;
    result
}
