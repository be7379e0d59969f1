//! Backend that runs jobs as child processes of the client.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fs::File;
use std::future::ready;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::watch;

use drmsession::backend::BackendFuture;
use drmsession::common::error::DrmsError;
use drmsession::common::id_counter::IdCounter;
use drmsession::placeholders::{PlaceholderValues, resolve_placeholders};
use drmsession::status::StatusCode;
use drmsession::{
    AttributeStore, BulkRange, ContactString, ControlAction, JobId, JobOutcome, JobStatus, Map,
    SchedulerBackend, Termination, WrappedArcMutex,
};

use crate::DRMS_VERSION;
use crate::backend::common::signal_name;

pub const LOCAL_DRM_SYSTEM: &str = "Local";

struct LocalJob {
    attributes: AttributeStore,
    bulk_index: Option<u32>,
    status: JobStatus,
    pid: Option<Pid>,
    terminate_requested: bool,
    outcome: Option<JobOutcome>,
}

impl LocalJob {
    fn new(attributes: AttributeStore, bulk_index: Option<u32>) -> Self {
        let status = if attributes.view().hold_on_submit() {
            JobStatus::UserOnHold
        } else {
            JobStatus::QueuedActive
        };
        Self {
            attributes,
            bulk_index,
            status,
            pid: None,
            terminate_requested: false,
            outcome: None,
        }
    }
}

type StateRef = WrappedArcMutex<LocalState>;

struct LocalState {
    contact: Option<ContactString>,
    max_running: usize,
    running: usize,
    counter: IdCounter,
    jobs: Map<JobId, LocalJob>,
    /// Jobs that were not started yet, in submission order
    queue: VecDeque<JobId>,
    changes: watch::Sender<u64>,
}

impl LocalState {
    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    fn job_mut(&mut self, job_id: &JobId) -> drmsession::Result<&mut LocalJob> {
        self.jobs
            .get_mut(job_id)
            .ok_or_else(|| DrmsError::NotFound(format!("job {job_id}")))
    }

    fn enqueue(&mut self, job_id: JobId, job: LocalJob) {
        self.queue.push_back(job_id.clone());
        self.jobs.insert(job_id, job);
    }

    fn finish(&mut self, job_id: &JobId, termination: Termination) {
        if let Some(job) = self.jobs.get_mut(job_id) {
            job.status = match termination {
                Termination::Exited { .. } => JobStatus::Done,
                _ => JobStatus::Failed,
            };
            job.pid = None;
            let mut outcome = JobOutcome::new(job_id.clone(), termination);
            outcome.terminated_by_request = job.terminate_requested;
            job.outcome = Some(outcome);
        }
    }
}

/// Starts queued jobs while there are free slots.
fn schedule(handle: &StateRef, state: &mut LocalState) {
    while state.running < state.max_running {
        let Some(position) = state.queue.iter().position(|id| {
            state
                .jobs
                .get(id)
                .is_some_and(|job| job.status == JobStatus::QueuedActive)
        }) else {
            break;
        };
        let Some(job_id) = state.queue.remove(position) else {
            break;
        };
        let Some(job) = state.jobs.get_mut(&job_id) else {
            continue;
        };
        match spawn_job(job) {
            Ok(child) => {
                job.status = JobStatus::Running;
                job.pid = child.id().map(|pid| Pid::from_raw(pid as i32));
                state.running += 1;
                log::debug!("Local: job {job_id} started with pid {:?}", job.pid);
                tokio::spawn(watch_job(handle.clone(), job_id, child));
            }
            Err(error) => {
                log::warn!("Local: job {job_id} could not be started: {error}");
                state.finish(&job_id, Termination::Aborted);
            }
        }
    }
    state.notify();
}

async fn watch_job(handle: StateRef, job_id: JobId, mut child: Child) {
    let termination = match child.wait().await {
        Ok(status) => termination_of(status),
        Err(error) => {
            log::error!("Local: waiting for job {job_id} failed: {error}");
            Termination::Aborted
        }
    };
    log::debug!("Local: job {job_id} finished: {termination:?}");
    let mut state = handle.lock();
    state.running = state.running.saturating_sub(1);
    state.finish(&job_id, termination);
    schedule(&handle, &mut *state);
}

fn termination_of(status: ExitStatus) -> Termination {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => Termination::Exited { code },
        (None, Some(signal)) => Termination::Signaled {
            signal: signal_name(signal),
            core_dumped: status.core_dumped(),
        },
        (None, None) => Termination::Aborted,
    }
}

fn resolve_path(path: &str, values: &PlaceholderValues, working_directory: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(resolve_placeholders(path, values));
    match working_directory {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

fn spawn_job(job: &LocalJob) -> std::io::Result<Child> {
    let view = job.attributes.view();
    let command = view.remote_command().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "remote command is not set")
    })?;

    let home = dirs::home_dir().map(|dir| dir.display().to_string());
    let mut values = PlaceholderValues {
        index: job.bulk_index.map(|index| Cow::Owned(index.to_string())),
        home_directory: home.as_deref().map(Cow::Borrowed),
        working_directory: None,
    };
    let working_directory = view
        .working_directory()
        .map(|wd| resolve_placeholders(wd, &values));
    values.working_directory = working_directory.as_deref().map(Cow::Borrowed);
    let wd = working_directory.as_deref().map(Path::new);

    let mut process = Command::new(command);
    process.args(view.args());
    if let Some(wd) = wd {
        process.current_dir(wd);
    }
    process.envs(view.environment());

    let stdin = match view.input_path() {
        Some(path) => Stdio::from(File::open(resolve_path(path, &values, wd))?),
        None => Stdio::null(),
    };
    let output = view
        .output_path()
        .map(|path| File::create(resolve_path(path, &values, wd)))
        .transpose()?;
    let error = if view.join_files() {
        output.as_ref().map(File::try_clone).transpose()?
    } else {
        view.error_path()
            .map(|path| File::create(resolve_path(path, &values, wd)))
            .transpose()?
    };
    process
        .stdin(stdin)
        .stdout(output.map(Stdio::from).unwrap_or_else(Stdio::null))
        .stderr(error.map(Stdio::from).unwrap_or_else(Stdio::null));
    process.spawn()
}

fn send_signal(job_id: &JobId, pid: Option<Pid>, signal: Signal) -> drmsession::Result<()> {
    let pid = pid.ok_or_else(|| {
        DrmsError::BackendError(format!("job {job_id} has no running process"))
    })?;
    kill(pid, signal).map_err(|error| {
        DrmsError::BackendError(format!("cannot send {signal} to job {job_id}: {error}"))
    })
}

fn apply_control(
    handle: &StateRef,
    state: &mut LocalState,
    job_id: &JobId,
    action: ControlAction,
) -> drmsession::Result<()> {
    let job = state.job_mut(job_id)?;
    let status = job.status;
    if status.is_terminal() {
        return Ok(());
    }
    match (action, status) {
        (ControlAction::Hold, JobStatus::QueuedActive) => job.status = JobStatus::UserOnHold,
        (ControlAction::Release, JobStatus::UserOnHold) => job.status = JobStatus::QueuedActive,
        (ControlAction::Suspend, JobStatus::Running) => {
            send_signal(job_id, job.pid, Signal::SIGSTOP)?;
            job.status = JobStatus::UserSuspended;
        }
        (ControlAction::Resume, JobStatus::UserSuspended) => {
            send_signal(job_id, job.pid, Signal::SIGCONT)?;
            job.status = JobStatus::Running;
        }
        (ControlAction::Terminate, JobStatus::Running | JobStatus::UserSuspended) => {
            job.terminate_requested = true;
            send_signal(job_id, job.pid, Signal::SIGKILL)?;
        }
        (ControlAction::Terminate, _) => {
            job.terminate_requested = true;
            state.queue.retain(|id| id != job_id);
            state.finish(job_id, Termination::Aborted);
        }
        (action, status) => {
            return Err(DrmsError::BackendError(format!(
                "cannot {action} job {job_id} in state {status}"
            )));
        }
    }
    schedule(handle, state);
    Ok(())
}

/// Executes jobs as local child processes, at most `max_running` at once.
///
/// Jobs keep running when the backend disconnects.
pub struct LocalBackend {
    state: StateRef,
}

impl LocalBackend {
    pub fn new(max_running: usize) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: WrappedArcMutex::wrap(LocalState {
                contact: None,
                max_running: max_running.max(1),
                running: 0,
                counter: IdCounter::default(),
                jobs: Map::new(),
                queue: VecDeque::new(),
                changes,
            }),
        }
    }

    fn with_state<T, F>(&self, f: F) -> BackendFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&StateRef, &mut LocalState) -> drmsession::Result<T> + Send + 'static,
    {
        let handle = self.state.clone();
        // Runs inside the runtime, spawning processes needs it
        Box::pin(async move {
            let mut state = handle.lock();
            if state.contact.is_none() {
                return Err(DrmsError::ConnectionError(
                    "local backend is not connected".to_string(),
                ));
            }
            f(&handle, &mut *state)
        })
    }
}

fn check_command(attributes: &AttributeStore) -> drmsession::Result<()> {
    match attributes.view().remote_command() {
        Some(_) => Ok(()),
        None => Err(DrmsError::SubmissionRejected(
            "remote command is not set".to_string(),
        )),
    }
}

impl SchedulerBackend for LocalBackend {
    fn drm_system(&self) -> String {
        LOCAL_DRM_SYSTEM.to_string()
    }

    fn connect(&self, contact: &ContactString) -> BackendFuture<()> {
        self.state.lock().contact = Some(contact.clone());
        Box::pin(ready(Ok(())))
    }

    fn disconnect(&self) -> BackendFuture<()> {
        self.state.lock().contact = None;
        Box::pin(ready(Ok(())))
    }

    fn submit(&self, attributes: AttributeStore) -> BackendFuture<JobId> {
        self.with_state(move |handle, state| {
            check_command(&attributes)?;
            let job_id = JobId::new(state.counter.next().to_string());
            state.enqueue(job_id.clone(), LocalJob::new(attributes, None));
            schedule(handle, state);
            Ok(job_id)
        })
    }

    fn submit_bulk(
        &self,
        attributes: AttributeStore,
        range: BulkRange,
    ) -> BackendFuture<Vec<JobId>> {
        self.with_state(move |handle, state| {
            check_command(&attributes)?;
            let array_id = state.counter.next();
            let ids: Vec<JobId> = range
                .iter()
                .map(|index| {
                    let job_id = JobId::new(format!("{array_id}.{index}"));
                    state.enqueue(
                        job_id.clone(),
                        LocalJob::new(attributes.clone(), Some(index)),
                    );
                    job_id
                })
                .collect();
            schedule(handle, state);
            Ok(ids)
        })
    }

    fn query_status(&self, job_id: &JobId) -> BackendFuture<StatusCode> {
        let job_id = job_id.clone();
        self.with_state(move |_, state| Ok(state.job_mut(&job_id)?.status.code()))
    }

    fn control(&self, job_id: &JobId, action: ControlAction) -> BackendFuture<()> {
        let job_id = job_id.clone();
        self.with_state(move |handle, state| apply_control(handle, state, &job_id, action))
    }

    fn poll_outcomes(&self, job_ids: &[JobId]) -> BackendFuture<Vec<JobOutcome>> {
        let job_ids = job_ids.to_vec();
        self.with_state(move |_, state| {
            let mut outcomes = Vec::new();
            for job_id in &job_ids {
                if let Some(outcome) = &state.job_mut(job_id)?.outcome {
                    outcomes.push(outcome.clone());
                }
            }
            Ok(outcomes)
        })
    }

    fn reap(&self, job_id: &JobId) -> BackendFuture<()> {
        let job_id = job_id.clone();
        self.with_state(move |_, state| {
            if !state.job_mut(&job_id)?.status.is_terminal() {
                return Err(DrmsError::BackendError(format!(
                    "job {job_id} has not finished yet"
                )));
            }
            state.jobs.remove(&job_id);
            Ok(())
        })
    }

    fn contact_info(&self) -> BackendFuture<String> {
        self.with_state(|_, state| {
            Ok(state
                .contact
                .as_ref()
                .map(|contact| contact.to_string())
                .unwrap_or_default())
        })
    }

    fn system_info(&self) -> BackendFuture<String> {
        self.with_state(|_, state| {
            Ok(format!(
                "Local executor {DRMS_VERSION} ({} slots)",
                state.max_running
            ))
        })
    }

    fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        Some(self.state.lock().changes.subscribe())
    }
}
