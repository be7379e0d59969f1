use crate::client::globalsettings::GlobalSettings;
use crate::client::output::SessionInfo;
use crate::client::session::{close_session, open_session};

pub async fn output_session_info(gsettings: &GlobalSettings) -> anyhow::Result<()> {
    let session = open_session(gsettings).await?;
    let info = async {
        anyhow::Ok(SessionInfo {
            drm_system: session.drm_system(),
            implementation: session.implementation(),
            version: session.version(),
            contact: session.contact().await?,
            system_info: session.drms_info().await?,
        })
    }
    .await;
    close_session(session).await;
    gsettings.printer().print_session_info(&info?);
    Ok(())
}
