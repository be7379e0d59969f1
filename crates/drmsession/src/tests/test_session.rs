use crate::attributes::{REMOTE_COMMAND, WORKING_DIRECTORY};
use crate::backend::memory::MemoryCluster;
use crate::common::error::DrmsError;
use crate::session::{DRMAA_VERSION, SessionState};
use crate::status::JobStatus;
use crate::tests::utils::{create_session, open_session, submit};

#[tokio::test]
async fn test_init_and_exit() {
    let cluster = MemoryCluster::new();
    let session = create_session(&cluster);
    assert_eq!(session.state(), SessionState::Closed);
    session.init("session=test").await.unwrap();
    assert!(session.is_open());
    session.exit().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_double_init() {
    let cluster = MemoryCluster::new();
    let session = open_session(&cluster).await;
    assert!(matches!(
        session.init("other").await,
        Err(DrmsError::DoubleInit)
    ));
    assert!(session.is_open());
}

#[tokio::test]
async fn test_init_empty_contact() {
    let cluster = MemoryCluster::new();
    let session = create_session(&cluster);
    assert!(matches!(
        session.init("").await,
        Err(DrmsError::ConnectionError(_))
    ));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_init_rejected_then_retry() {
    let cluster = MemoryCluster::new();
    let session = create_session(&cluster);
    cluster.set_online(false);
    assert!(matches!(
        session.init("test").await,
        Err(DrmsError::ConnectionError(_))
    ));
    assert_eq!(session.state(), SessionState::Closed);
    cluster.set_online(true);
    session.init("test").await.unwrap();
}

#[tokio::test]
async fn test_exit_when_closed() {
    let cluster = MemoryCluster::new();
    let session = create_session(&cluster);
    assert!(matches!(session.exit().await, Err(DrmsError::NotActive)));

    session.init("test").await.unwrap();
    session.exit().await.unwrap();
    assert!(matches!(session.exit().await, Err(DrmsError::NotActive)));
}

#[tokio::test]
async fn test_reinit_after_exit() {
    let cluster = MemoryCluster::new();
    let session = open_session(&cluster).await;
    session.exit().await.unwrap();
    session.init("again").await.unwrap();
    assert_eq!(session.contact().await.unwrap(), "again");
}

#[tokio::test]
async fn test_queries_in_any_state() {
    let cluster = MemoryCluster::new();
    let session = create_session(&cluster);
    assert_eq!(session.drm_system(), "Memory");
    assert_eq!(session.version(), DRMAA_VERSION);
    assert_eq!(session.version().to_string(), "1.0");
    assert!(session.implementation().starts_with("drmsession "));

    assert!(matches!(
        session.contact().await,
        Err(DrmsError::NotActive)
    ));
    assert!(matches!(
        session.drms_info().await,
        Err(DrmsError::NotActive)
    ));

    session.init("session=abc").await.unwrap();
    assert_eq!(session.contact().await.unwrap(), "session=abc");
    assert!(session.drms_info().await.unwrap().starts_with("Memory cluster"));
}

#[tokio::test]
async fn test_template_values() {
    let cluster = MemoryCluster::new();
    let session = open_session(&cluster).await;
    let template = session.allocate_template().unwrap();

    session.set_value(template, "k", "v").unwrap();
    assert_eq!(session.get_value(template, "k").unwrap(), vec!["v"]);

    session.set_values(template, "k", ["a", "b"]).unwrap();
    assert_eq!(session.get_value(template, "k").unwrap(), vec!["a", "b"]);

    session.set_value(template, "k", "c").unwrap();
    assert_eq!(session.get_value(template, "k").unwrap(), vec!["c"]);

    assert!(matches!(
        session.get_value(template, "missing"),
        Err(DrmsError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_keys() {
    let cluster = MemoryCluster::new();
    let session = open_session(&cluster).await;
    let template = session.allocate_template().unwrap();
    assert!(session.list_keys(template).unwrap().is_empty());

    session.set_value(template, REMOTE_COMMAND, "/bin/hostname").unwrap();
    session
        .set_value(template, WORKING_DIRECTORY, "/tmp")
        .unwrap();
    session.set_value(template, REMOTE_COMMAND, "/bin/date").unwrap();

    let mut keys: Vec<String> = session.list_keys(template).unwrap().into_iter().collect();
    keys.sort();
    assert_eq!(keys, vec![REMOTE_COMMAND, WORKING_DIRECTORY]);
}

#[tokio::test]
async fn test_delete_template_invalidates_only_it() {
    let cluster = MemoryCluster::new();
    let session = open_session(&cluster).await;
    let templates: Vec<_> = (0..5)
        .map(|_| session.allocate_template().unwrap())
        .collect();
    session.delete_template(templates[2]).unwrap();

    for (index, template) in templates.iter().enumerate() {
        let result = session.set_value(*template, "k", "v");
        if index == 2 {
            assert!(matches!(result, Err(DrmsError::InvalidHandle(_))));
        } else {
            result.unwrap();
        }
    }
    assert!(matches!(
        session.delete_template(templates[2]),
        Err(DrmsError::InvalidHandle(_))
    ));
}

#[tokio::test]
async fn test_templates_require_open_session() {
    let cluster = MemoryCluster::new();
    let session = create_session(&cluster);
    assert!(matches!(
        session.allocate_template(),
        Err(DrmsError::NotActive)
    ));

    session.init("test").await.unwrap();
    let template = session.allocate_template().unwrap();
    session.exit().await.unwrap();
    assert!(matches!(
        session.set_value(template, "k", "v"),
        Err(DrmsError::NotActive)
    ));
}

#[tokio::test]
async fn test_exit_invalidates_templates() {
    let cluster = MemoryCluster::new();
    let session = open_session(&cluster).await;
    let old = session.allocate_template().unwrap();
    session.exit().await.unwrap();

    session.init("test").await.unwrap();
    assert!(matches!(
        session.get_value(old, REMOTE_COMMAND),
        Err(DrmsError::InvalidHandle(_))
    ));
    let new = session.allocate_template().unwrap();
    assert!(new > old);
}

#[tokio::test]
async fn test_exit_keeps_jobs_running() {
    let cluster = MemoryCluster::new();
    let session = open_session(&cluster).await;
    let job_id = submit(&session).await;
    cluster.start_job(&job_id).unwrap();
    session.exit().await.unwrap();
    assert_eq!(cluster.status(&job_id), Some(JobStatus::Running));

    let other = open_session(&cluster).await;
    assert_eq!(other.job_status(&job_id).await.unwrap(), JobStatus::Running);
    assert!(other.outstanding_jobs().unwrap().is_empty());
}

#[tokio::test]
async fn test_operations_after_exit() {
    let cluster = MemoryCluster::new();
    let session = open_session(&cluster).await;
    let job_id = submit(&session).await;
    session.exit().await.unwrap();

    assert!(matches!(
        session.job_status(&job_id).await,
        Err(DrmsError::NotActive)
    ));
    assert!(matches!(
        session
            .control(
                &job_id.clone().into(),
                crate::backend::ControlAction::Hold
            )
            .await,
        Err(DrmsError::NotActive)
    ));
    assert!(matches!(
        session
            .wait(&job_id.into(), crate::wait::Timeout::NoWait)
            .await,
        Err(DrmsError::NotActive)
    ));
}

#[tokio::test]
async fn test_sessions_share_cluster() {
    let cluster = MemoryCluster::new();
    let first = open_session(&cluster).await;
    let second = open_session(&cluster).await;
    let job_id = submit(&first).await;
    assert_eq!(
        second.job_status(&job_id).await.unwrap(),
        JobStatus::QueuedActive
    );
}

#[tokio::test]
async fn test_adopt_jobs_of_previous_session() {
    let cluster = MemoryCluster::new();
    let first = open_session(&cluster).await;
    let a = submit(&first).await;
    let b = submit(&first).await;
    first.exit().await.unwrap();
    cluster.finish_job(&a, 4).unwrap();

    let second = open_session(&cluster).await;
    let own = submit(&second).await;
    second.adopt_jobs(&[b.clone(), a.clone(), own.clone()]).unwrap();
    assert_eq!(second.outstanding_jobs().unwrap(), vec![own, b, a.clone()]);

    let outcome = second
        .wait(&a.into(), crate::wait::Timeout::NoWait)
        .await
        .unwrap();
    assert_eq!(outcome.exit_code(), Some(4));
}
