use clap::Parser;

use drmsession::{ControlAction, JobId, JobIdentifier, Session};

use crate::client::globalsettings::GlobalSettings;
use crate::client::session::{close_session, open_session};

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum ControlArg {
    /// Stop a running job
    Suspend,
    /// Continue a suspended job
    Resume,
    /// Keep a queued job from starting
    Hold,
    /// Allow a held job to start
    Release,
    /// Kill the job or remove it from the queue
    Terminate,
}

impl From<ControlArg> for ControlAction {
    fn from(arg: ControlArg) -> Self {
        match arg {
            ControlArg::Suspend => ControlAction::Suspend,
            ControlArg::Resume => ControlAction::Resume,
            ControlArg::Hold => ControlAction::Hold,
            ControlArg::Release => ControlAction::Release,
            ControlArg::Terminate => ControlAction::Terminate,
        }
    }
}

#[derive(Parser)]
pub struct ControlOpts {
    /// Action applied to the jobs
    #[arg(value_enum)]
    pub action: ControlArg,

    /// IDs of the jobs
    #[arg(required = true)]
    pub job_ids: Vec<String>,
}

async fn control_in_session(
    gsettings: &GlobalSettings,
    session: &Session,
    opts: ControlOpts,
) -> anyhow::Result<()> {
    let action = ControlAction::from(opts.action);
    let job_ids: Vec<JobId> = opts.job_ids.into_iter().map(JobId::from).collect();
    for job_id in &job_ids {
        session
            .control(&JobIdentifier::from(job_id.clone()), action)
            .await?;
    }
    gsettings.printer().print_control_applied(action, &job_ids);
    Ok(())
}

pub async fn control_jobs(gsettings: &GlobalSettings, opts: ControlOpts) -> anyhow::Result<()> {
    let session = open_session(gsettings).await?;
    let result = control_in_session(gsettings, &session, opts).await;
    close_session(session).await;
    result
}
