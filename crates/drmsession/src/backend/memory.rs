//! Scheduler simulated in memory.
//!
//! A [`MemoryCluster`] holds the jobs; any number of [`MemoryBackend`]s (and therefore sessions)
//! can connect to the same cluster and see the same jobs. Jobs never progress on their own,
//! the owner of the cluster moves them through their lifecycle with [`MemoryCluster::start_job`],
//! [`MemoryCluster::finish_job`] and [`MemoryCluster::fail_job`].

use std::future::ready;

use tokio::sync::watch;

use crate::attributes::AttributeStore;
use crate::backend::{BackendFuture, ControlAction, SchedulerBackend};
use crate::common::error::DrmsError;
use crate::common::id_counter::IdCounter;
use crate::common::{Map, WrappedArcMutex};
use crate::contact::ContactString;
use crate::jobid::{BulkRange, JobId};
use crate::outcome::{JobOutcome, Termination};
use crate::status::{JobStatus, StatusCode};

pub const MEMORY_DRM_SYSTEM: &str = "Memory";

#[derive(Debug)]
struct MemoryJob {
    status: JobStatus,
    /// Reported instead of `status` by status queries when set.
    raw_code: Option<StatusCode>,
    attributes: AttributeStore,
    bulk_index: Option<u32>,
    outcome: Option<JobOutcome>,
}

impl MemoryJob {
    fn new(attributes: AttributeStore, bulk_index: Option<u32>) -> Self {
        let status = if attributes.view().hold_on_submit() {
            JobStatus::UserOnHold
        } else {
            JobStatus::QueuedActive
        };
        Self {
            status,
            raw_code: None,
            attributes,
            bulk_index,
            outcome: None,
        }
    }
}

#[derive(Debug)]
struct ClusterState {
    system_info: String,
    online: bool,
    counter: IdCounter,
    jobs: Map<JobId, MemoryJob>,
    changes: watch::Sender<u64>,
}

impl ClusterState {
    fn notify(&self) {
        self.changes.send_modify(|generation| {
            *generation = generation.wrapping_add(1);
        });
    }

    fn job(&self, job_id: &JobId) -> crate::Result<&MemoryJob> {
        self.jobs
            .get(job_id)
            .ok_or_else(|| DrmsError::NotFound(format!("job {job_id}")))
    }

    fn job_mut(&mut self, job_id: &JobId) -> crate::Result<&mut MemoryJob> {
        self.jobs
            .get_mut(job_id)
            .ok_or_else(|| DrmsError::NotFound(format!("job {job_id}")))
    }

    fn complete(
        &mut self,
        job_id: &JobId,
        status: JobStatus,
        outcome: JobOutcome,
    ) -> crate::Result<()> {
        let job = self.job_mut(job_id)?;
        if job.status.is_terminal() {
            return Err(DrmsError::BackendError(format!(
                "job {job_id} has already finished"
            )));
        }
        job.status = status;
        job.raw_code = None;
        job.outcome = Some(outcome);
        self.notify();
        Ok(())
    }
}

/// In-memory cluster shared by all backends created from it.
#[derive(Clone, Debug)]
pub struct MemoryCluster {
    state: WrappedArcMutex<ClusterState>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::with_system_info(format!("Memory cluster {}", crate::DRMS_VERSION))
    }

    pub fn with_system_info(system_info: impl Into<String>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            state: WrappedArcMutex::wrap(ClusterState {
                system_info: system_info.into(),
                online: true,
                counter: IdCounter::default(),
                jobs: Map::new(),
                changes,
            }),
        }
    }

    pub fn backend(&self) -> MemoryBackend {
        MemoryBackend {
            cluster: self.clone(),
            contact: WrappedArcMutex::wrap(None),
        }
    }

    /// An offline cluster refuses connections and fails every request.
    pub fn set_online(&self, online: bool) {
        self.state.lock().online = online;
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.state.lock().jobs.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn status(&self, job_id: &JobId) -> Option<JobStatus> {
        self.state.lock().jobs.get(job_id).map(|job| job.status)
    }

    pub fn attributes(&self, job_id: &JobId) -> Option<AttributeStore> {
        self.state
            .lock()
            .jobs
            .get(job_id)
            .map(|job| job.attributes.clone())
    }

    pub fn bulk_index(&self, job_id: &JobId) -> Option<u32> {
        self.state
            .lock()
            .jobs
            .get(job_id)
            .and_then(|job| job.bulk_index)
    }

    /// Moves a queued job to the running state.
    pub fn start_job(&self, job_id: &JobId) -> crate::Result<()> {
        let mut state = self.state.lock();
        let job = state.job_mut(job_id)?;
        if job.status != JobStatus::QueuedActive {
            return Err(DrmsError::BackendError(format!(
                "job {job_id} cannot start from state {}",
                job.status
            )));
        }
        job.status = JobStatus::Running;
        state.notify();
        Ok(())
    }

    /// Finishes a job that exited with the given code.
    pub fn finish_job(&self, job_id: &JobId, exit_code: i32) -> crate::Result<()> {
        let outcome = JobOutcome::exited(job_id.clone(), exit_code);
        self.state
            .lock()
            .complete(job_id, JobStatus::Done, outcome)
    }

    pub fn finish_job_with_usage(
        &self,
        job_id: &JobId,
        exit_code: i32,
        resource_usage: Map<String, String>,
    ) -> crate::Result<()> {
        let mut outcome = JobOutcome::exited(job_id.clone(), exit_code);
        outcome.resource_usage = resource_usage;
        self.state
            .lock()
            .complete(job_id, JobStatus::Done, outcome)
    }

    pub fn fail_job(&self, job_id: &JobId, termination: Termination) -> crate::Result<()> {
        let outcome = JobOutcome::new(job_id.clone(), termination);
        self.state
            .lock()
            .complete(job_id, JobStatus::Failed, outcome)
    }

    /// Makes status queries of the job report an arbitrary code.
    pub fn set_raw_status(&self, job_id: &JobId, code: StatusCode) -> crate::Result<()> {
        let mut state = self.state.lock();
        state.job_mut(job_id)?.raw_code = Some(code);
        state.notify();
        Ok(())
    }
}

fn apply_control(job_id: &JobId, job: &mut MemoryJob, action: ControlAction) -> crate::Result<()> {
    if job.status.is_terminal() {
        return Ok(());
    }
    let status = match (action, job.status) {
        (ControlAction::Suspend, JobStatus::Running) => JobStatus::UserSuspended,
        (ControlAction::Suspend, JobStatus::UserSuspended) => JobStatus::UserSuspended,
        (ControlAction::Resume, JobStatus::UserSuspended) => JobStatus::Running,
        (ControlAction::Resume, JobStatus::Running) => JobStatus::Running,
        (ControlAction::Hold, JobStatus::QueuedActive) => JobStatus::UserOnHold,
        (ControlAction::Hold, JobStatus::SystemOnHold) => JobStatus::UserSystemOnHold,
        (ControlAction::Hold, status @ (JobStatus::UserOnHold | JobStatus::UserSystemOnHold)) => {
            status
        }
        (ControlAction::Release, JobStatus::UserOnHold) => JobStatus::QueuedActive,
        (ControlAction::Release, JobStatus::UserSystemOnHold) => JobStatus::SystemOnHold,
        (ControlAction::Release, JobStatus::QueuedActive) => JobStatus::QueuedActive,
        (ControlAction::Terminate, status) => {
            let termination = if status == JobStatus::Running || status.is_suspended() {
                Termination::Signaled {
                    signal: "SIGKILL".to_string(),
                    core_dumped: false,
                }
            } else {
                Termination::Aborted
            };
            let mut outcome = JobOutcome::new(job_id.clone(), termination);
            outcome.terminated_by_request = true;
            job.outcome = Some(outcome);
            JobStatus::Failed
        }
        (action, status) => {
            return Err(DrmsError::BackendError(format!(
                "cannot {action} job {job_id} in state {status}"
            )));
        }
    };
    job.status = status;
    job.raw_code = None;
    Ok(())
}

/// Connection of one session to a [`MemoryCluster`].
pub struct MemoryBackend {
    cluster: MemoryCluster,
    contact: WrappedArcMutex<Option<ContactString>>,
}

impl MemoryBackend {
    pub fn cluster(&self) -> &MemoryCluster {
        &self.cluster
    }

    fn with_state<T, F>(&self, f: F) -> BackendFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ClusterState) -> crate::Result<T>,
    {
        let result = if self.contact.lock().is_none() {
            Err(DrmsError::ConnectionError(
                "backend is not connected".to_string(),
            ))
        } else {
            let mut state = self.cluster.state.lock();
            if state.online {
                f(&mut state)
            } else {
                Err(DrmsError::ConnectionError("cluster is offline".to_string()))
            }
        };
        Box::pin(ready(result))
    }
}

impl SchedulerBackend for MemoryBackend {
    fn drm_system(&self) -> String {
        MEMORY_DRM_SYSTEM.to_string()
    }

    fn connect(&self, contact: &ContactString) -> BackendFuture<()> {
        let result = if self.cluster.state.lock().online {
            *self.contact.lock() = Some(contact.clone());
            Ok(())
        } else {
            Err(DrmsError::ConnectionError(format!(
                "cannot connect to `{contact}`: cluster is offline"
            )))
        };
        Box::pin(ready(result))
    }

    fn disconnect(&self) -> BackendFuture<()> {
        self.contact.lock().take();
        Box::pin(ready(Ok(())))
    }

    fn submit(&self, attributes: AttributeStore) -> BackendFuture<JobId> {
        self.with_state(move |state| {
            if attributes.view().remote_command().is_none() {
                return Err(DrmsError::SubmissionRejected(
                    "remote command is not set".to_string(),
                ));
            }
            let job_id = JobId::new(state.counter.next().to_string());
            log::debug!("Memory cluster: submitted job {job_id}");
            state
                .jobs
                .insert(job_id.clone(), MemoryJob::new(attributes, None));
            state.notify();
            Ok(job_id)
        })
    }

    fn submit_bulk(
        &self,
        attributes: AttributeStore,
        range: BulkRange,
    ) -> BackendFuture<Vec<JobId>> {
        self.with_state(move |state| {
            if attributes.view().remote_command().is_none() {
                return Err(DrmsError::SubmissionRejected(
                    "remote command is not set".to_string(),
                ));
            }
            let cluster_id = state.counter.next();
            let ids: Vec<JobId> = range
                .iter()
                .map(|index| {
                    let job_id = JobId::new(format!("{cluster_id}.{index}"));
                    state.jobs.insert(
                        job_id.clone(),
                        MemoryJob::new(attributes.clone(), Some(index)),
                    );
                    job_id
                })
                .collect();
            log::debug!(
                "Memory cluster: submitted array {cluster_id} with {} tasks",
                ids.len()
            );
            state.notify();
            Ok(ids)
        })
    }

    fn query_status(&self, job_id: &JobId) -> BackendFuture<StatusCode> {
        let job_id = job_id.clone();
        self.with_state(move |state| {
            let job = state.job(&job_id)?;
            Ok(job.raw_code.unwrap_or_else(|| job.status.code()))
        })
    }

    fn control(&self, job_id: &JobId, action: ControlAction) -> BackendFuture<()> {
        let job_id = job_id.clone();
        self.with_state(move |state| {
            apply_control(&job_id, state.job_mut(&job_id)?, action)?;
            state.notify();
            Ok(())
        })
    }

    fn poll_outcomes(&self, job_ids: &[JobId]) -> BackendFuture<Vec<JobOutcome>> {
        let job_ids = job_ids.to_vec();
        self.with_state(move |state| {
            let mut outcomes = Vec::new();
            for job_id in &job_ids {
                let job = state.job(job_id)?;
                if job.status.is_terminal() {
                    let outcome = job.outcome.clone().ok_or_else(|| {
                        DrmsError::BackendProtocolError(format!(
                            "terminal job {job_id} has no outcome"
                        ))
                    })?;
                    outcomes.push(outcome);
                }
            }
            Ok(outcomes)
        })
    }

    fn reap(&self, job_id: &JobId) -> BackendFuture<()> {
        let job_id = job_id.clone();
        self.with_state(move |state| {
            if !state.job(&job_id)?.status.is_terminal() {
                return Err(DrmsError::BackendError(format!(
                    "job {job_id} has not finished yet"
                )));
            }
            state.jobs.remove(&job_id);
            Ok(())
        })
    }

    fn contact_info(&self) -> BackendFuture<String> {
        let contact = self.contact.lock().as_ref().map(|c| c.to_string());
        self.with_state(move |_| Ok(contact.unwrap_or_default()))
    }

    fn system_info(&self) -> BackendFuture<String> {
        self.with_state(|state| Ok(state.system_info.clone()))
    }

    fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        Some(self.cluster.state.lock().changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{HOLD_STATE, JOB_SUBMISSION_STATE, REMOTE_COMMAND};

    fn template() -> AttributeStore {
        let mut attributes = AttributeStore::default();
        attributes.set_value(REMOTE_COMMAND, "/bin/true");
        attributes
    }

    async fn connected(cluster: &MemoryCluster) -> MemoryBackend {
        let backend = cluster.backend();
        backend
            .connect(&ContactString::parse("test").unwrap())
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn requires_connection() {
        let cluster = MemoryCluster::new();
        let backend = cluster.backend();
        assert!(matches!(
            backend.submit(template()).await,
            Err(DrmsError::ConnectionError(_))
        ));
    }

    #[tokio::test]
    async fn offline_cluster_refuses_connect() {
        let cluster = MemoryCluster::new();
        cluster.set_online(false);
        let backend = cluster.backend();
        assert!(matches!(
            backend.connect(&ContactString::parse("x").unwrap()).await,
            Err(DrmsError::ConnectionError(_))
        ));
    }

    #[tokio::test]
    async fn submit_without_command_is_rejected() {
        let cluster = MemoryCluster::new();
        let backend = connected(&cluster).await;
        assert!(matches!(
            backend.submit(AttributeStore::default()).await,
            Err(DrmsError::SubmissionRejected(_))
        ));
    }

    #[tokio::test]
    async fn submit_on_hold() {
        let cluster = MemoryCluster::new();
        let backend = connected(&cluster).await;
        let mut attributes = template();
        attributes.set_value(JOB_SUBMISSION_STATE, HOLD_STATE);
        let job_id = backend.submit(attributes).await.unwrap();
        assert_eq!(cluster.status(&job_id), Some(JobStatus::UserOnHold));
        backend
            .control(&job_id, ControlAction::Release)
            .await
            .unwrap();
        assert_eq!(cluster.status(&job_id), Some(JobStatus::QueuedActive));
    }

    #[tokio::test]
    async fn bulk_ids() {
        let cluster = MemoryCluster::new();
        let backend = connected(&cluster).await;
        let ids = backend
            .submit_bulk(template(), BulkRange::new(1, 10, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(
            ids.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
            vec!["1.1", "1.3", "1.5", "1.7", "1.9"]
        );
        assert_eq!(cluster.bulk_index(&ids[2]), Some(5));
    }

    #[tokio::test]
    async fn suspend_resume() {
        let cluster = MemoryCluster::new();
        let backend = connected(&cluster).await;
        let job_id = backend.submit(template()).await.unwrap();
        assert!(
            backend
                .control(&job_id, ControlAction::Suspend)
                .await
                .is_err()
        );
        cluster.start_job(&job_id).unwrap();
        backend
            .control(&job_id, ControlAction::Suspend)
            .await
            .unwrap();
        assert_eq!(cluster.status(&job_id), Some(JobStatus::UserSuspended));
        backend
            .control(&job_id, ControlAction::Resume)
            .await
            .unwrap();
        assert_eq!(cluster.status(&job_id), Some(JobStatus::Running));
    }

    #[tokio::test]
    async fn terminate_queued_job_aborts() {
        let cluster = MemoryCluster::new();
        let backend = connected(&cluster).await;
        let job_id = backend.submit(template()).await.unwrap();
        backend
            .control(&job_id, ControlAction::Terminate)
            .await
            .unwrap();
        let outcomes = backend
            .poll_outcomes(std::slice::from_ref(&job_id))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].was_aborted());
        assert!(outcomes[0].terminated_by_request);
    }

    #[tokio::test]
    async fn control_finished_job_is_noop() {
        let cluster = MemoryCluster::new();
        let backend = connected(&cluster).await;
        let job_id = backend.submit(template()).await.unwrap();
        cluster.finish_job(&job_id, 3).unwrap();
        for action in [
            ControlAction::Suspend,
            ControlAction::Resume,
            ControlAction::Hold,
            ControlAction::Release,
            ControlAction::Terminate,
        ] {
            backend.control(&job_id, action).await.unwrap();
        }
        let outcomes = backend
            .poll_outcomes(std::slice::from_ref(&job_id))
            .await
            .unwrap();
        assert_eq!(outcomes[0].exit_code(), Some(3));
        assert!(!outcomes[0].terminated_by_request);
    }

    #[tokio::test]
    async fn reap_removes_job() {
        let cluster = MemoryCluster::new();
        let backend = connected(&cluster).await;
        let job_id = backend.submit(template()).await.unwrap();
        assert!(backend.reap(&job_id).await.is_err());
        cluster.finish_job(&job_id, 0).unwrap();
        backend.reap(&job_id).await.unwrap();
        assert!(matches!(
            backend.query_status(&job_id).await,
            Err(DrmsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn changes_are_published() {
        let cluster = MemoryCluster::new();
        let backend = connected(&cluster).await;
        let mut receiver = backend.subscribe().unwrap();
        let job_id = backend.submit(template()).await.unwrap();
        assert!(receiver.has_changed().unwrap());
        receiver.borrow_and_update();
        cluster.start_job(&job_id).unwrap();
        assert!(receiver.has_changed().unwrap());
    }
}
