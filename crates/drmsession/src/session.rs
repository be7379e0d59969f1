use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::attributes::AttributeStore;
use crate::backend::{ControlAction, SchedulerBackend};
use crate::common::error::DrmsError;
use crate::common::{Map, Set, WrappedArcMutex};
use crate::contact::ContactString;
use crate::jobid::{BulkJobId, BulkRange, JobId, JobIdentifier};
use crate::status::JobStatus;
use crate::template::{TemplateId, TemplateRegistry};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Builder, Clone, Debug)]
#[builder(pattern = "owned")]
pub struct SessionConfig {
    /// How often waiting operations ask the backend for finished jobs.
    #[builder(default = "DEFAULT_POLL_INTERVAL")]
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Version of the job submission contract implemented by the session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

pub const DRMAA_VERSION: Version = Version { major: 1, minor: 0 };

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug)]
pub(crate) struct JobClaim {
    order: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    /// `init` is waiting for the backend to accept the contact.
    Connecting,
    Open,
    /// `exit` is waiting for the backend to disconnect.
    Disconnecting,
}

#[derive(Debug)]
pub(crate) struct SessionInner {
    state: SessionState,
    /// Incremented by every successful `init`.
    epoch: u64,
    contact: Option<ContactString>,
    templates: TemplateRegistry,
    /// Submitted and not yet reaped jobs, mapped to their submission order.
    outstanding: Map<JobId, u64>,
    /// Finished jobs taken by a waiter that is reaping them.
    reaping: Set<JobId>,
    submit_counter: u64,
}

impl SessionInner {
    fn check_open(&self) -> crate::Result<()> {
        if self.state == SessionState::Open {
            Ok(())
        } else {
            Err(DrmsError::NotActive)
        }
    }

    fn check_epoch(&self, epoch: u64) -> crate::Result<()> {
        self.check_open()?;
        if self.epoch == epoch {
            Ok(())
        } else {
            Err(DrmsError::NotActive)
        }
    }

    pub(crate) fn outstanding_ids(&self) -> Vec<JobId> {
        let mut jobs: Vec<(&JobId, u64)> = self
            .outstanding
            .iter()
            .map(|(job_id, order)| (job_id, *order))
            .collect();
        jobs.sort_unstable_by_key(|(_, order)| *order);
        jobs.into_iter().map(|(job_id, _)| job_id.clone()).collect()
    }

    pub(crate) fn is_outstanding(&self, job_id: &JobId) -> bool {
        self.outstanding.contains_key(job_id)
    }

    fn invalidate(&mut self) {
        self.contact = None;
        self.templates.clear();
        self.outstanding.clear();
        self.reaping.clear();
    }
}

/// Session with a scheduler.
///
/// The session is an owned object, several sessions (also connected to the same scheduler)
/// can exist at once. All operations take `&self`; long running operations (submission,
/// waiting) never keep the internal state locked while they wait for the backend.
pub struct Session {
    pub(crate) backend: Arc<dyn SchedulerBackend>,
    pub(crate) config: SessionConfig,
    pub(crate) inner: WrappedArcMutex<SessionInner>,
    /// Bumped when the session is closed, wakes up pending waits.
    pub(crate) lifecycle: watch::Sender<u64>,
}

impl Session {
    pub fn new(backend: Arc<dyn SchedulerBackend>, config: SessionConfig) -> Self {
        let (lifecycle, _) = watch::channel(0);
        Self {
            backend,
            config,
            inner: WrappedArcMutex::wrap(SessionInner {
                state: SessionState::Closed,
                epoch: 0,
                contact: None,
                templates: TemplateRegistry::default(),
                outstanding: Map::new(),
                reaping: Set::new(),
                submit_counter: 0,
            }),
            lifecycle,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Opens the session.
    pub async fn init(&self, contact: &str) -> crate::Result<()> {
        {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Closed {
                return Err(DrmsError::DoubleInit);
            }
            inner.state = SessionState::Connecting;
        }

        let result = match ContactString::parse(contact) {
            Ok(contact) => self.backend.connect(&contact).await.map(|_| contact),
            Err(error) => Err(error),
        };

        let mut inner = self.inner.lock();
        match result {
            Ok(contact) => {
                log::info!(
                    "Session opened with contact `{contact}` ({})",
                    self.backend.drm_system()
                );
                inner.state = SessionState::Open;
                inner.epoch += 1;
                inner.contact = Some(contact);
                Ok(())
            }
            Err(error) => {
                log::debug!("Session initialization failed: {error}");
                inner.state = SessionState::Closed;
                Err(error)
            }
        }
    }

    /// Closes the session. Templates and the set of outstanding jobs are dropped,
    /// submitted jobs keep running in the scheduler.
    ///
    /// The session is closed even when the backend fails to disconnect, the error is
    /// returned afterwards.
    pub async fn exit(&self) -> crate::Result<()> {
        {
            let mut inner = self.inner.lock();
            inner.check_open()?;
            inner.state = SessionState::Disconnecting;
            inner.invalidate();
        }
        self.lifecycle.send_modify(|value| *value = value.wrapping_add(1));

        let result = self.backend.disconnect().await;
        self.inner.lock().state = SessionState::Closed;
        match &result {
            Ok(()) => log::info!("Session closed"),
            Err(error) => log::warn!("Session closed, backend disconnect failed: {error}"),
        }
        result
    }

    /// Contact of the scheduler connection.
    pub async fn contact(&self) -> crate::Result<String> {
        self.inner.lock().check_open()?;
        self.backend.contact_info().await
    }

    /// Description of the scheduler system.
    pub async fn drms_info(&self) -> crate::Result<String> {
        self.inner.lock().check_open()?;
        self.backend.system_info().await
    }

    pub fn drm_system(&self) -> String {
        self.backend.drm_system()
    }

    pub fn implementation(&self) -> String {
        format!("{} {}", env!("CARGO_PKG_NAME"), crate::DRMS_VERSION)
    }

    pub fn version(&self) -> Version {
        DRMAA_VERSION
    }

    pub(crate) fn with_open<T>(
        &self,
        f: impl FnOnce(&mut SessionInner) -> crate::Result<T>,
    ) -> crate::Result<T> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        f(&mut inner)
    }

    /// Epoch of the open session, used to detect that the session was closed while an
    /// operation was waiting for the backend.
    pub(crate) fn open_epoch(&self) -> crate::Result<u64> {
        self.with_open(|inner| Ok(inner.epoch))
    }

    pub(crate) fn with_epoch<T>(
        &self,
        epoch: u64,
        f: impl FnOnce(&mut SessionInner) -> crate::Result<T>,
    ) -> crate::Result<T> {
        let mut inner = self.inner.lock();
        inner.check_epoch(epoch)?;
        f(&mut inner)
    }

    /// Takes a finished job for reaping. Returns `None` when another waiter already took it,
    /// otherwise the position of the job among the outstanding jobs (if it was tracked).
    pub(crate) fn claim_job(&self, epoch: u64, job_id: &JobId) -> crate::Result<Option<JobClaim>> {
        self.with_epoch(epoch, |inner| {
            if !inner.reaping.insert(job_id.clone()) {
                return Ok(None);
            }
            Ok(Some(JobClaim {
                order: inner.outstanding.remove(job_id),
            }))
        })
    }

    /// Ends a claim. A job that could not be reaped is tracked again.
    pub(crate) fn release_claim(&self, epoch: u64, job_id: &JobId, claim: JobClaim, reaped: bool) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        inner.reaping.remove(job_id);
        if let (false, Some(order)) = (reaped, claim.order) {
            inner.outstanding.insert(job_id.clone(), order);
        }
    }

    fn track_jobs(&self, epoch: u64, job_ids: &[JobId]) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Open || inner.epoch != epoch {
            log::warn!(
                "Session was closed during submission, {} job(s) will not be tracked",
                job_ids.len()
            );
            return;
        }
        for job_id in job_ids {
            inner.submit_counter += 1;
            let order = inner.submit_counter;
            inner.outstanding.insert(job_id.clone(), order);
        }
    }

    /// Starts tracking jobs submitted by an earlier session (e.g. a previous process),
    /// so that they can be waited for. Jobs that are already tracked keep their position.
    pub fn adopt_jobs(&self, job_ids: &[JobId]) -> crate::Result<()> {
        self.with_open(|inner| {
            for job_id in job_ids {
                if !inner.is_outstanding(job_id) {
                    inner.submit_counter += 1;
                    let order = inner.submit_counter;
                    inner.outstanding.insert(job_id.clone(), order);
                }
            }
            Ok(())
        })
    }

    /// Jobs submitted by this session that were not reaped yet, in submission order.
    pub fn outstanding_jobs(&self) -> crate::Result<Vec<JobId>> {
        self.with_open(|inner| Ok(inner.outstanding_ids()))
    }

    pub fn allocate_template(&self) -> crate::Result<TemplateId> {
        self.with_open(|inner| Ok(inner.templates.allocate()))
    }

    pub fn delete_template(&self, template: TemplateId) -> crate::Result<()> {
        self.with_open(|inner| inner.templates.delete(template))
    }

    pub fn set_value(
        &self,
        template: TemplateId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> crate::Result<()> {
        self.with_open(|inner| {
            inner.templates.get_mut(template)?.set_value(key, value);
            Ok(())
        })
    }

    pub fn set_values<I, S>(
        &self,
        template: TemplateId,
        key: impl Into<String>,
        values: I,
    ) -> crate::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_open(|inner| {
            inner.templates.get_mut(template)?.set_values(key, values);
            Ok(())
        })
    }

    /// Scalars are returned as a vector with a single item.
    pub fn get_value(&self, template: TemplateId, key: &str) -> crate::Result<Vec<String>> {
        self.with_open(|inner| inner.templates.get(template)?.get_value(key))
    }

    pub fn list_keys(&self, template: TemplateId) -> crate::Result<Set<String>> {
        self.with_open(|inner| Ok(inner.templates.get(template)?.list_keys()))
    }

    fn snapshot(&self, template: TemplateId) -> crate::Result<(u64, AttributeStore)> {
        self.with_open(|inner| Ok((inner.epoch, inner.templates.snapshot(template)?)))
    }

    pub async fn run_job(&self, template: TemplateId) -> crate::Result<JobIdentifier> {
        let (epoch, attributes) = self.snapshot(template)?;
        let job_id = self.backend.submit(attributes).await?;
        log::debug!("Job {job_id} submitted from template {template}");
        self.track_jobs(epoch, std::slice::from_ref(&job_id));
        Ok(JobIdentifier::Single(job_id))
    }

    /// Submits an array job with indices `start, start + step, ...` up to `end` (inclusive).
    pub async fn run_bulk_jobs(
        &self,
        template: TemplateId,
        start: u32,
        end: u32,
        step: u32,
    ) -> crate::Result<JobIdentifier> {
        let (epoch, attributes) = self.snapshot(template)?;
        let range = BulkRange::new(start, end, step)?;
        let job_ids = self.backend.submit_bulk(attributes, range).await?;
        log::debug!(
            "Bulk job {range} submitted from template {template}: {} task(s)",
            job_ids.len()
        );
        self.track_jobs(epoch, &job_ids);
        Ok(JobIdentifier::Bulk(BulkJobId::new(range, job_ids)?))
    }

    /// Expands an identifier into job ids. The sentinel expands into the outstanding jobs.
    pub(crate) fn resolve_ids(inner: &SessionInner, identifier: &JobIdentifier) -> Vec<JobId> {
        match identifier {
            JobIdentifier::Single(job_id) => vec![job_id.clone()],
            JobIdentifier::Bulk(bulk) => bulk.task_ids().to_vec(),
            JobIdentifier::AllOfSession => inner.outstanding_ids(),
        }
    }

    pub async fn control(
        &self,
        identifier: &JobIdentifier,
        action: ControlAction,
    ) -> crate::Result<()> {
        let job_ids = self.with_open(|inner| Ok(Self::resolve_ids(inner, identifier)))?;
        log::debug!("Applying {action} to {} job(s)", job_ids.len());
        for job_id in &job_ids {
            self.backend.control(job_id, action).await?;
        }
        Ok(())
    }

    /// Current status of a job. Does not wait for anything.
    pub async fn job_status(&self, job_id: &JobId) -> crate::Result<JobStatus> {
        self.inner.lock().check_open()?;
        let code = self.backend.query_status(job_id).await?;
        JobStatus::from_code(code)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("drm_system", &self.backend.drm_system())
            .field("config", &self.config)
            .field("inner", &self.inner)
            .finish()
    }
}
