use std::future::pending;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

use crate::common::Set;
use crate::common::error::DrmsError;
use crate::jobid::{JobId, JobIdentifier};
use crate::outcome::JobOutcome;
use crate::session::Session;

/// How long a waiting operation may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Forever,
    /// Check once and return immediately.
    NoWait,
    After(Duration),
}

impl Timeout {
    pub const RAW_FOREVER: i64 = -1;
    pub const RAW_NO_WAIT: i64 = 0;

    /// Converts a timeout in seconds where `-1` means forever and `0` means no waiting.
    pub fn from_raw(seconds: i64) -> crate::Result<Timeout> {
        match seconds {
            Self::RAW_FOREVER => Ok(Timeout::Forever),
            Self::RAW_NO_WAIT => Ok(Timeout::NoWait),
            s if s > 0 => Ok(Timeout::After(Duration::from_secs(s as u64))),
            s => Err(DrmsError::InvalidArgument(format!("invalid timeout {s}"))),
        }
    }

    fn deadline(self, now: Instant) -> Option<Instant> {
        match self {
            Timeout::Forever => None,
            Timeout::NoWait => Some(now),
            Timeout::After(duration) => Some(now + duration),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Timeout::NoWait
        } else {
            Timeout::After(duration)
        }
    }
}

/// Sleeps between two polls of the backend.
///
/// Wakes up after the poll interval, at the deadline, when the backend reports a change
/// or when the session is closed, whichever comes first.
struct PollTimer {
    deadline: Option<Instant>,
    poll_interval: Duration,
    backend_changes: Option<watch::Receiver<u64>>,
    lifecycle: Option<watch::Receiver<u64>>,
}

impl PollTimer {
    /// Returns `false` once the deadline has passed.
    async fn next_poll(&mut self) -> bool {
        let now = Instant::now();
        let mut wake_at = now + self.poll_interval;
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                return false;
            }
            wake_at = wake_at.min(deadline);
        }
        tokio::select! {
            _ = next_change(&mut self.backend_changes) => {}
            _ = next_change(&mut self.lifecycle) => {}
            _ = sleep_until(wake_at) => {}
        }
        true
    }
}

/// Resolves when the channel changes. A missing or closed channel never resolves.
async fn next_change(receiver: &mut Option<watch::Receiver<u64>>) {
    if let Some(changes) = receiver.as_mut() {
        if changes.changed().await.is_ok() {
            return;
        }
    }
    *receiver = None;
    pending::<()>().await
}

impl Session {
    fn poll_timer(&self, timeout: Timeout) -> PollTimer {
        PollTimer {
            deadline: timeout.deadline(Instant::now()),
            poll_interval: self.config.poll_interval,
            backend_changes: self.backend.subscribe(),
            lifecycle: Some(self.lifecycle.subscribe()),
        }
    }

    /// Jobs that may satisfy a wait on `identifier`.
    fn wait_candidates(&self, epoch: u64, identifier: &JobIdentifier) -> crate::Result<Vec<JobId>> {
        self.with_epoch(epoch, |inner| match identifier {
            JobIdentifier::Single(job_id) => Ok(vec![job_id.clone()]),
            JobIdentifier::Bulk(bulk) => {
                let tasks: Vec<JobId> = bulk
                    .task_ids()
                    .iter()
                    .filter(|job_id| inner.is_outstanding(job_id))
                    .cloned()
                    .collect();
                if tasks.is_empty() {
                    Err(DrmsError::NotFound(format!(
                        "all tasks of bulk job {} were already reaped",
                        bulk.range()
                    )))
                } else {
                    Ok(tasks)
                }
            }
            JobIdentifier::AllOfSession => {
                let jobs = inner.outstanding_ids();
                if jobs.is_empty() {
                    Err(DrmsError::NotFound(
                        "session has no outstanding jobs".to_string(),
                    ))
                } else {
                    Ok(jobs)
                }
            }
        })
    }

    /// Reaps a finished job. Returns `false` when a concurrent wait of this session
    /// took the job first.
    async fn dispose(&self, epoch: u64, job_id: &JobId) -> crate::Result<bool> {
        let Some(claim) = self.claim_job(epoch, job_id)? else {
            return Ok(false);
        };
        let result = self.backend.reap(job_id).await;
        self.release_claim(epoch, job_id, claim, result.is_ok());
        result.map(|_| true)
    }

    /// Jobs from `job_ids` that this session no longer tracks.
    fn untracked(&self, epoch: u64, job_ids: &[JobId]) -> crate::Result<Vec<JobId>> {
        self.with_epoch(epoch, |inner| {
            Ok(job_ids
                .iter()
                .filter(|job_id| !inner.is_outstanding(job_id))
                .cloned()
                .collect())
        })
    }

    /// Waits until the job finishes and returns its outcome. The job is reaped, another
    /// wait on it fails with [`DrmsError::NotFound`].
    ///
    /// For a bulk identifier the first finished task is returned, for
    /// [`JobIdentifier::AllOfSession`] the first finished outstanding job.
    pub async fn wait(
        &self,
        identifier: &JobIdentifier,
        timeout: Timeout,
    ) -> crate::Result<JobOutcome> {
        let epoch = self.open_epoch()?;
        let mut timer = self.poll_timer(timeout);
        loop {
            // The sentinel is resolved again in every round, jobs can be submitted meanwhile
            let candidates = self.wait_candidates(epoch, identifier)?;
            let outcomes = match self.backend.poll_outcomes(&candidates).await {
                Ok(outcomes) => outcomes,
                // A concurrent wait reaped one of the candidates
                Err(DrmsError::NotFound(_))
                    if identifier.as_single().is_none()
                        && !self.untracked(epoch, &candidates)?.is_empty() =>
                {
                    continue;
                }
                Err(error) => return Err(error),
            };
            let mut taken = false;
            for outcome in outcomes {
                if self.dispose(epoch, &outcome.job_id).await? {
                    log::debug!("Wait finished: job {} is terminal", outcome.job_id);
                    return Ok(outcome);
                }
                taken = true;
            }
            if taken {
                // Let the wait that took the job finish reaping it
                tokio::task::yield_now().await;
            } else if !timer.next_poll().await {
                return Err(DrmsError::Timeout);
            }
        }
    }

    /// Waits until all given jobs finish.
    ///
    /// With `dispose` each job is reaped as soon as it is seen terminal, also when the
    /// call later fails with a timeout. Without it the jobs stay queryable.
    pub async fn synchronize(
        &self,
        identifiers: &[JobIdentifier],
        timeout: Timeout,
        dispose: bool,
    ) -> crate::Result<()> {
        if identifiers.is_empty() {
            return Err(DrmsError::InvalidArgument(
                "no jobs to synchronize with".to_string(),
            ));
        }
        let epoch = self.open_epoch()?;
        let mut unfinished: Vec<JobId> = self.with_epoch(epoch, |inner| {
            let mut seen = Set::new();
            let mut jobs = Vec::new();
            for identifier in identifiers {
                let ids = match identifier {
                    JobIdentifier::Bulk(bulk) => bulk
                        .task_ids()
                        .iter()
                        .filter(|job_id| inner.is_outstanding(job_id))
                        .cloned()
                        .collect(),
                    identifier => Session::resolve_ids(inner, identifier),
                };
                for job_id in ids {
                    if seen.insert(job_id.clone()) {
                        jobs.push(job_id);
                    }
                }
            }
            Ok(jobs)
        })?;
        let tracked: Set<JobId> = self.with_epoch(epoch, |inner| {
            Ok(unfinished
                .iter()
                .filter(|job_id| inner.is_outstanding(job_id))
                .cloned()
                .collect())
        })?;

        let mut timer = self.poll_timer(timeout);
        loop {
            self.with_epoch(epoch, |_| Ok(()))?;
            if unfinished.is_empty() {
                return Ok(());
            }
            let outcomes = match self.backend.poll_outcomes(&unfinished).await {
                Ok(outcomes) => outcomes,
                Err(DrmsError::NotFound(message)) => {
                    // Jobs reaped by a concurrent wait of this session have finished
                    let reaped: Vec<JobId> = self
                        .untracked(epoch, &unfinished)?
                        .into_iter()
                        .filter(|job_id| tracked.contains(job_id))
                        .collect();
                    if reaped.is_empty() {
                        return Err(DrmsError::NotFound(message));
                    }
                    unfinished.retain(|job_id| !reaped.contains(job_id));
                    continue;
                }
                Err(error) => return Err(error),
            };
            for outcome in outcomes {
                unfinished.retain(|job_id| job_id != &outcome.job_id);
                if dispose {
                    self.dispose(epoch, &outcome.job_id).await?;
                }
            }
            if unfinished.is_empty() {
                log::debug!("Synchronize finished");
                return Ok(());
            }
            if !timer.next_poll().await {
                log::debug!(
                    "Synchronize timed out with {} unfinished job(s)",
                    unfinished.len()
                );
                return Err(DrmsError::Timeout);
            }
        }
    }
}
