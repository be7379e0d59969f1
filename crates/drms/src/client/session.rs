use anyhow::Context;

use drmsession::{Session, SessionConfigBuilder};

use crate::backend::{BackendKind, create_backend};
use crate::client::globalsettings::GlobalSettings;

/// Contact used when neither the command line nor the configuration names one.
pub const DEFAULT_CONTACT: &str = "session=drms";

/// Backend used when neither the command line nor the configuration names one.
pub const DEFAULT_BACKEND: BackendKind = BackendKind::Condor;

/// Creates a session for the scheduler selected by the command line and the configuration,
/// and opens it.
pub async fn open_session(gsettings: &GlobalSettings) -> anyhow::Result<Session> {
    let opts = gsettings.session_opts();
    let config = gsettings.config();

    let kind = opts.backend.or(config.backend).unwrap_or(DEFAULT_BACKEND);
    let contact = opts
        .contact
        .clone()
        .or_else(|| config.contact.clone())
        .unwrap_or_else(|| DEFAULT_CONTACT.to_string());

    let mut builder = SessionConfigBuilder::default();
    if let Some(interval) = opts.poll_interval.or(config.poll_interval()?) {
        builder = builder.poll_interval(interval);
    }
    let session_config = builder.build().context("Invalid session configuration")?;

    let backend = create_backend(kind, config)?;
    let session = Session::new(backend, session_config);
    session
        .init(&contact)
        .await
        .with_context(|| format!("Cannot open a session with contact `{contact}`"))?;
    Ok(session)
}

/// Closes the session. A failed disconnect is only reported, the command result is kept.
pub async fn close_session(session: Session) {
    if let Err(error) = session.exit().await {
        log::warn!("Closing the session failed: {error}");
    }
}
