use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::attributes::{ARGV, AttributeStore, REMOTE_COMMAND};
use crate::backend::memory::{MemoryBackend, MemoryCluster};
use crate::backend::{BackendFuture, ControlAction, SchedulerBackend};
use crate::contact::ContactString;
use crate::jobid::{BulkRange, JobId, JobIdentifier};
use crate::outcome::JobOutcome;
use crate::status::StatusCode;
use crate::session::{Session, SessionConfigBuilder};
use crate::template::TemplateId;

pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[allow(unused)]
pub fn enable_test_logging() {
    env_logger::builder().is_test(true).init()
}

pub fn create_session(cluster: &MemoryCluster) -> Session {
    create_session_with_interval(cluster, TEST_POLL_INTERVAL)
}

pub fn create_session_with_interval(cluster: &MemoryCluster, poll_interval: Duration) -> Session {
    let config = SessionConfigBuilder::default()
        .poll_interval(poll_interval)
        .build()
        .unwrap();
    Session::new(Arc::new(cluster.backend()), config)
}

pub async fn open_session(cluster: &MemoryCluster) -> Session {
    let session = create_session(cluster);
    session.init("session=test").await.unwrap();
    session
}

pub fn command_template(session: &Session) -> TemplateId {
    let template = session.allocate_template().unwrap();
    session
        .set_value(template, REMOTE_COMMAND, "/bin/sleep")
        .unwrap();
    session.set_values(template, ARGV, ["1"]).unwrap();
    template
}

pub async fn submit(session: &Session) -> JobId {
    let template = command_template(session);
    single_id(session.run_job(template).await.unwrap())
}

pub fn single_id(identifier: JobIdentifier) -> JobId {
    match identifier {
        JobIdentifier::Single(job_id) => job_id,
        identifier => panic!("Expected a single job id, got {identifier:?}"),
    }
}

pub fn expect_error_message<T: std::fmt::Debug>(result: crate::Result<T>, msg: &str) {
    match result {
        Ok(value) => panic!("Expected error, got Ok({value:?})"),
        Err(error) => {
            let formatted = error.to_string();
            if !formatted.contains(msg) {
                panic!("Did not find `{msg}` in `{formatted}`");
            }
        }
    }
}

/// Memory backend whose operations yield to the runtime once before they complete,
/// so that concurrent session calls interleave at every backend call.
pub struct YieldingBackend(pub MemoryBackend);

fn yielding<T: Send + 'static>(future: BackendFuture<T>) -> BackendFuture<T> {
    Box::pin(async move {
        tokio::task::yield_now().await;
        future.await
    })
}

impl SchedulerBackend for YieldingBackend {
    fn drm_system(&self) -> String {
        self.0.drm_system()
    }

    fn connect(&self, contact: &ContactString) -> BackendFuture<()> {
        yielding(self.0.connect(contact))
    }

    fn disconnect(&self) -> BackendFuture<()> {
        yielding(self.0.disconnect())
    }

    fn submit(&self, attributes: AttributeStore) -> BackendFuture<JobId> {
        yielding(self.0.submit(attributes))
    }

    fn submit_bulk(
        &self,
        attributes: AttributeStore,
        range: BulkRange,
    ) -> BackendFuture<Vec<JobId>> {
        yielding(self.0.submit_bulk(attributes, range))
    }

    fn query_status(&self, job_id: &JobId) -> BackendFuture<StatusCode> {
        yielding(self.0.query_status(job_id))
    }

    fn control(&self, job_id: &JobId, action: ControlAction) -> BackendFuture<()> {
        yielding(self.0.control(job_id, action))
    }

    fn poll_outcomes(&self, job_ids: &[JobId]) -> BackendFuture<Vec<JobOutcome>> {
        yielding(self.0.poll_outcomes(job_ids))
    }

    fn reap(&self, job_id: &JobId) -> BackendFuture<()> {
        yielding(self.0.reap(job_id))
    }

    fn contact_info(&self) -> BackendFuture<String> {
        yielding(self.0.contact_info())
    }

    fn system_info(&self) -> BackendFuture<String> {
        yielding(self.0.system_info())
    }

    fn subscribe(&self) -> Option<watch::Receiver<u64>> {
        self.0.subscribe()
    }
}

pub async fn open_yielding_session(cluster: &MemoryCluster) -> Session {
    let config = SessionConfigBuilder::default()
        .poll_interval(TEST_POLL_INTERVAL)
        .build()
        .unwrap();
    let session = Session::new(Arc::new(YieldingBackend(cluster.backend())), config);
    session.init("session=test").await.unwrap();
    session
}
