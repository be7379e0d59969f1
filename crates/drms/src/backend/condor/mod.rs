//! Backend that drives HTCondor through its command line tools.

mod parse;
mod submitfile;

use std::path::{Path, PathBuf};

use anyhow::Context;
use futures::future::try_join_all;
use tempfile::TempDir;

use drmsession::backend::BackendFuture;
use drmsession::common::error::DrmsError;
use drmsession::outcome::JobOutcome;
use drmsession::status::StatusCode;
use drmsession::{
    AttributeStore, BulkRange, ContactString, ControlAction, JobId, Map, SchedulerBackend, Set,
    WrappedArcMutex,
};

use crate::backend::common::run_tool;
use crate::backend::condor::parse::{
    JobRecord, QUERY_ATTRIBUTES, parse_job_records, parse_submit_output,
};
pub use crate::backend::condor::submitfile::render_submit_file;

pub const CONDOR_DRM_SYSTEM: &str = "Condor";

/// Contact key that overrides the spool directory.
pub const SPOOL_KEY: &str = "spool";

enum Spool {
    Fixed(PathBuf),
    Temporary(TempDir),
}

impl Spool {
    fn path(&self) -> &Path {
        match self {
            Spool::Fixed(path) => path,
            Spool::Temporary(dir) => dir.path(),
        }
    }
}

#[derive(Default)]
struct CondorState {
    contact: Option<ContactString>,
    spool: Option<Spool>,
    submit_counter: u64,
    /// Jobs suspended through this client
    suspended: Set<JobId>,
    /// Condor keeps finished jobs in its history, reaping is tracked here.
    reaped: Set<JobId>,
}

#[derive(Clone)]
struct Tools {
    bin_dir: Option<PathBuf>,
}

impl Tools {
    fn path(&self, name: &str) -> String {
        match &self.bin_dir {
            Some(dir) => dir.join(name).display().to_string(),
            None => name.to_string(),
        }
    }

    async fn run(&self, name: &str, args: &[&str], workdir: Option<&Path>) -> anyhow::Result<String> {
        let program = self.path(name);
        let mut arguments = vec![program.as_str()];
        arguments.extend_from_slice(args);
        run_tool(arguments, workdir).await
    }

    /// Records of the given jobs. Jobs that already left the queue are looked up
    /// in the history. Unknown jobs are missing from the result.
    async fn query(&self, job_ids: &[JobId]) -> drmsession::Result<Map<JobId, JobRecord>> {
        let mut records = Map::with_capacity(job_ids.len());
        if job_ids.is_empty() {
            return Ok(records);
        }
        let attributes = QUERY_ATTRIBUTES.join(",");

        let mut args: Vec<&str> = job_ids.iter().map(|id| id.as_str()).collect();
        args.extend_from_slice(&["-json", "-attributes", &attributes]);
        let output = self
            .run("condor_q", &args, None)
            .await
            .map_err(connection_error)?;
        for record in parse_job_records(&output)? {
            records.insert(record.job_id(), record);
        }

        let missing = job_ids.iter().filter(|id| !records.contains_key(*id));
        let history = try_join_all(missing.map(|job_id| {
            let args = [
                job_id.as_str(),
                "-limit",
                "1",
                "-json",
                "-attributes",
                attributes.as_str(),
            ];
            async move { self.run("condor_history", &args, None).await }
        }))
        .await
        .map_err(connection_error)?;
        for output in history {
            if let Some(record) = parse_job_records(&output)?.into_iter().next() {
                records.insert(record.job_id(), record);
            }
        }
        Ok(records)
    }

    async fn query_one(&self, job_id: &JobId) -> drmsession::Result<JobRecord> {
        self.query(std::slice::from_ref(job_id))
            .await?
            .remove(job_id)
            .ok_or_else(|| DrmsError::NotFound(format!("job {job_id}")))
    }
}

fn connection_error(error: anyhow::Error) -> DrmsError {
    DrmsError::ConnectionError(format!("{error:#}"))
}

fn control_tool(action: ControlAction) -> &'static str {
    match action {
        ControlAction::Suspend => "condor_suspend",
        ControlAction::Resume => "condor_continue",
        ControlAction::Hold => "condor_hold",
        ControlAction::Release => "condor_release",
        ControlAction::Terminate => "condor_rm",
    }
}

struct SubmitRequest {
    tools: Tools,
    spool: PathBuf,
    name: String,
}

impl SubmitRequest {
    async fn submit(
        self,
        attributes: AttributeStore,
        bulk: Option<BulkRange>,
    ) -> drmsession::Result<Vec<JobId>> {
        let log_path = self.spool.join(format!("{}.log", self.name));
        let submit_path = self.spool.join(format!("{}.sub", self.name));
        let description = render_submit_file(&attributes, bulk, &log_path)?;
        tokio::fs::write(&submit_path, description)
            .await
            .with_context(|| format!("Cannot write {}", submit_path.display()))?;

        let submit_file = submit_path.display().to_string();
        let output = self
            .tools
            .run("condor_submit", &[&submit_file], Some(&self.spool))
            .await
            .map_err(|error| DrmsError::SubmissionRejected(format!("{error:#}")))?;
        let (count, cluster) = parse_submit_output(&output)?;

        let expected = bulk.map(|range| range.count()).unwrap_or(1);
        if count != expected {
            return Err(DrmsError::BackendProtocolError(format!(
                "Condor queued {count} job(s) in cluster {cluster}, expected {expected}"
            )));
        }
        log::debug!("Condor: submitted {count} job(s) to cluster {cluster}");
        Ok((0..count)
            .map(|process| JobId::new(format!("{cluster}.{process}")))
            .collect())
    }
}

pub struct CondorBackend {
    tools: Tools,
    spool_dir: Option<PathBuf>,
    state: WrappedArcMutex<CondorState>,
}

impl CondorBackend {
    /// `bin_dir` contains the Condor tools, `PATH` is searched when it is missing.
    /// Submit descriptions and job logs are written to `spool_dir`, or to a temporary
    /// directory that lives until disconnect.
    pub fn new(bin_dir: Option<PathBuf>, spool_dir: Option<PathBuf>) -> Self {
        Self {
            tools: Tools { bin_dir },
            spool_dir,
            state: Default::default(),
        }
    }

    fn not_connected() -> DrmsError {
        DrmsError::ConnectionError("Condor backend is not connected".to_string())
    }

    fn submit_request(&self) -> drmsession::Result<SubmitRequest> {
        let mut state = self.state.lock();
        if state.contact.is_none() {
            return Err(Self::not_connected());
        }
        state.submit_counter += 1;
        let name = format!("job-{}", state.submit_counter);
        let spool = state
            .spool
            .as_ref()
            .map(|spool| spool.path().to_path_buf())
            .ok_or_else(Self::not_connected)?;
        Ok(SubmitRequest {
            tools: self.tools.clone(),
            spool,
            name,
        })
    }

    /// Fails when the backend is disconnected or the job was already reaped.
    fn check_job(&self, job_id: &JobId) -> drmsession::Result<()> {
        let state = self.state.lock();
        if state.contact.is_none() {
            Err(Self::not_connected())
        } else if state.reaped.contains(job_id) {
            Err(DrmsError::NotFound(format!("job {job_id}")))
        } else {
            Ok(())
        }
    }
}

impl SchedulerBackend for CondorBackend {
    fn drm_system(&self) -> String {
        CONDOR_DRM_SYSTEM.to_string()
    }

    fn connect(&self, contact: &ContactString) -> BackendFuture<()> {
        let tools = self.tools.clone();
        let state = self.state.clone();
        let contact = contact.clone();
        let spool_dir = contact
            .get(SPOOL_KEY)
            .map(PathBuf::from)
            .or_else(|| self.spool_dir.clone());

        Box::pin(async move {
            tools
                .run("condor_version", &[], None)
                .await
                .map_err(|error| {
                    DrmsError::ConnectionError(format!("Condor is not available: {error:#}"))
                })?;
            let spool = match spool_dir {
                Some(path) => {
                    tokio::fs::create_dir_all(&path).await.map_err(|error| {
                        DrmsError::ConnectionError(format!(
                            "cannot create spool directory {}: {error}",
                            path.display()
                        ))
                    })?;
                    Spool::Fixed(path)
                }
                None => Spool::Temporary(
                    tempfile::Builder::new()
                        .prefix("drms-condor-")
                        .tempdir()
                        .map_err(|error| DrmsError::ConnectionError(error.to_string()))?,
                ),
            };
            log::debug!(
                "Condor: connected as `{contact}`, spool directory {}",
                spool.path().display()
            );
            let mut state = state.lock();
            state.contact = Some(contact);
            state.spool = Some(spool);
            Ok(())
        })
    }

    fn disconnect(&self) -> BackendFuture<()> {
        let spool = {
            let mut state = self.state.lock();
            state.contact = None;
            state.spool.take()
        };
        drop(spool);
        Box::pin(std::future::ready(Ok(())))
    }

    fn submit(&self, attributes: AttributeStore) -> BackendFuture<JobId> {
        let request = self.submit_request();
        Box::pin(async move {
            request?
                .submit(attributes, None)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    DrmsError::BackendProtocolError("Condor did not queue any job".to_string())
                })
        })
    }

    fn submit_bulk(
        &self,
        attributes: AttributeStore,
        range: BulkRange,
    ) -> BackendFuture<Vec<JobId>> {
        let request = self.submit_request();
        Box::pin(async move { request?.submit(attributes, Some(range)).await })
    }

    fn query_status(&self, job_id: &JobId) -> BackendFuture<StatusCode> {
        let checked = self.check_job(job_id);
        let tools = self.tools.clone();
        let state = self.state.clone();
        let job_id = job_id.clone();
        Box::pin(async move {
            checked?;
            let record = tools.query_one(&job_id).await?;
            let user_suspended = state.lock().suspended.contains(&job_id);
            Ok(record.status(user_suspended)?.code())
        })
    }

    fn control(&self, job_id: &JobId, action: ControlAction) -> BackendFuture<()> {
        let checked = self.check_job(job_id);
        let tools = self.tools.clone();
        let state = self.state.clone();
        let job_id = job_id.clone();
        Box::pin(async move {
            checked?;
            if tools.query_one(&job_id).await?.is_terminal() {
                return Ok(());
            }
            tools
                .run(control_tool(action), &[job_id.as_str()], None)
                .await
                .map_err(|error| DrmsError::BackendError(format!("{error:#}")))?;
            let mut state = state.lock();
            match action {
                ControlAction::Suspend => {
                    state.suspended.insert(job_id);
                }
                ControlAction::Resume | ControlAction::Terminate => {
                    state.suspended.remove(&job_id);
                }
                ControlAction::Hold | ControlAction::Release => {}
            }
            Ok(())
        })
    }

    fn poll_outcomes(&self, job_ids: &[JobId]) -> BackendFuture<Vec<JobOutcome>> {
        let checked = if self.state.lock().contact.is_none() {
            Err(Self::not_connected())
        } else {
            job_ids.iter().try_for_each(|job_id| self.check_job(job_id))
        };
        let tools = self.tools.clone();
        let job_ids = job_ids.to_vec();
        Box::pin(async move {
            checked?;
            let records = tools.query(&job_ids).await?;
            let mut outcomes = Vec::new();
            for job_id in &job_ids {
                let record = records
                    .get(job_id)
                    .ok_or_else(|| DrmsError::NotFound(format!("job {job_id}")))?;
                outcomes.extend(record.outcome());
            }
            Ok(outcomes)
        })
    }

    fn reap(&self, job_id: &JobId) -> BackendFuture<()> {
        let checked = self.check_job(job_id);
        let tools = self.tools.clone();
        let state = self.state.clone();
        let job_id = job_id.clone();
        Box::pin(async move {
            checked?;
            if !tools.query_one(&job_id).await?.is_terminal() {
                return Err(DrmsError::BackendError(format!(
                    "job {job_id} has not finished yet"
                )));
            }
            let mut state = state.lock();
            state.suspended.remove(&job_id);
            state.reaped.insert(job_id);
            Ok(())
        })
    }

    fn contact_info(&self) -> BackendFuture<String> {
        let result = self
            .state
            .lock()
            .contact
            .as_ref()
            .map(|contact| contact.to_string())
            .ok_or_else(Self::not_connected);
        Box::pin(std::future::ready(result))
    }

    fn system_info(&self) -> BackendFuture<String> {
        let tools = self.tools.clone();
        Box::pin(async move {
            let output = tools
                .run("condor_version", &[], None)
                .await
                .map_err(connection_error)?;
            Ok(output.lines().next().unwrap_or_default().trim().to_string())
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    use super::*;
    use drmsession::attributes::REMOTE_COMMAND;
    use drmsession::{JobIdentifier, JobStatus, Session, SessionConfig, Timeout};

    fn write_tool(dir: &Path, name: &str, script: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Directory with fake Condor tools. `condor_q` reports job 7.0 as running,
    /// `condor_history` reports job 7.1 as completed.
    fn fake_condor() -> TempDir {
        let dir = TempDir::new().unwrap();
        let path = dir.path();
        write_tool(path, "condor_version", "echo '$CondorVersion: 23.0.0 2023-09-29 $'");
        write_tool(
            path,
            "condor_submit",
            "echo 'Submitting job(s)..'\necho '1 job(s) submitted to cluster 7.'",
        );
        write_tool(
            path,
            "condor_q",
            r#"case "$1" in 7.0) echo '[{"ClusterId": 7, "ProcId": 0, "JobStatus": 2}]';; esac"#,
        );
        write_tool(
            path,
            "condor_history",
            r#"case "$1" in 7.1) echo '[{"ClusterId": 7, "ProcId": 1, "JobStatus": 4, "ExitCode": 5}]';; esac"#,
        );
        write_tool(path, "condor_hold", "exit 0");
        dir
    }

    async fn connected(bin_dir: &Path, spool: &Path) -> CondorBackend {
        let backend = CondorBackend::new(Some(bin_dir.to_path_buf()), Some(spool.to_path_buf()));
        backend
            .connect(&ContactString::parse("session=test").unwrap())
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_connect_without_condor() {
        let dir = TempDir::new().unwrap();
        let backend = CondorBackend::new(Some(dir.path().to_path_buf()), None);
        assert!(matches!(
            backend
                .connect(&ContactString::parse("test").unwrap())
                .await,
            Err(DrmsError::ConnectionError(_))
        ));
        assert!(matches!(
            backend.contact_info().await,
            Err(DrmsError::ConnectionError(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_writes_description() {
        let tools = fake_condor();
        let spool = TempDir::new().unwrap();
        let backend = connected(tools.path(), spool.path()).await;

        let mut attributes = AttributeStore::default();
        attributes.set_value(REMOTE_COMMAND, "/bin/true");
        let job_id = backend.submit(attributes).await.unwrap();
        assert_eq!(job_id, JobId::new("7.0"));

        let description = std::fs::read_to_string(spool.path().join("job-1.sub")).unwrap();
        assert!(description.contains("executable = /bin/true\n"));
        assert!(description.ends_with("queue 1\n"));
    }

    #[tokio::test]
    async fn test_submit_bulk_count_mismatch() {
        let tools = fake_condor();
        let spool = TempDir::new().unwrap();
        let backend = connected(tools.path(), spool.path()).await;

        let mut attributes = AttributeStore::default();
        attributes.set_value(REMOTE_COMMAND, "/bin/true");
        assert!(matches!(
            backend
                .submit_bulk(attributes, BulkRange::new(1, 3, 1).unwrap())
                .await,
            Err(DrmsError::BackendProtocolError(_))
        ));
    }

    #[tokio::test]
    async fn test_status_and_outcomes() {
        let tools = fake_condor();
        let spool = TempDir::new().unwrap();
        let backend = connected(tools.path(), spool.path()).await;

        let running = JobId::new("7.0");
        let finished = JobId::new("7.1");
        assert_eq!(
            backend.query_status(&running).await.unwrap(),
            JobStatus::Running.code()
        );
        assert_eq!(
            backend.query_status(&finished).await.unwrap(),
            JobStatus::Done.code()
        );
        assert!(matches!(
            backend.query_status(&JobId::new("8.0")).await,
            Err(DrmsError::NotFound(_))
        ));

        let outcomes = backend
            .poll_outcomes(&[running.clone(), finished.clone()])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].job_id, finished);
        assert_eq!(outcomes[0].exit_code(), Some(5));

        assert!(matches!(
            backend.reap(&running).await,
            Err(DrmsError::BackendError(_))
        ));
        backend.reap(&finished).await.unwrap();
        assert!(matches!(
            backend.query_status(&finished).await,
            Err(DrmsError::NotFound(_))
        ));
        assert!(matches!(
            backend.poll_outcomes(&[finished]).await,
            Err(DrmsError::NotFound(_))
        ));
        assert!(matches!(
            backend.poll_outcomes(&[running, JobId::new("8.0")]).await,
            Err(DrmsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_session_wait_on_reaped_job() {
        let tools = fake_condor();
        let spool = TempDir::new().unwrap();
        let backend = CondorBackend::new(
            Some(tools.path().to_path_buf()),
            Some(spool.path().to_path_buf()),
        );
        let session = Session::new(Arc::new(backend), SessionConfig::default());
        session.init("session=test").await.unwrap();

        let finished = JobIdentifier::from(JobId::new("7.1"));
        let outcome = session.wait(&finished, Timeout::Forever).await.unwrap();
        assert_eq!(outcome.exit_code(), Some(5));
        assert!(matches!(
            session.wait(&finished, Timeout::Forever).await,
            Err(DrmsError::NotFound(_))
        ));
        assert!(matches!(
            session
                .wait(&JobIdentifier::from(JobId::new("8.0")), Timeout::Forever)
                .await,
            Err(DrmsError::NotFound(_))
        ));
        session.exit().await.unwrap();
    }

    #[tokio::test]
    async fn test_control_finished_job_is_noop() {
        let tools = fake_condor();
        let spool = TempDir::new().unwrap();
        let backend = connected(tools.path(), spool.path()).await;

        // There is no fake condor_rm
        backend
            .control(&JobId::new("7.1"), ControlAction::Terminate)
            .await
            .unwrap();
        backend
            .control(&JobId::new("7.0"), ControlAction::Hold)
            .await
            .unwrap();
        assert!(matches!(
            backend
                .control(&JobId::new("7.0"), ControlAction::Terminate)
                .await,
            Err(DrmsError::BackendError(_))
        ));
    }

    #[tokio::test]
    async fn test_system_info() {
        let tools = fake_condor();
        let spool = TempDir::new().unwrap();
        let backend = connected(tools.path(), spool.path()).await;
        assert_eq!(
            backend.system_info().await.unwrap(),
            "$CondorVersion: 23.0.0 2023-09-29 $"
        );
        assert_eq!(backend.contact_info().await.unwrap(), "session=test");
    }
}
