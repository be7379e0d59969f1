use crate::client::output::Output;
use crate::common::cli::SessionOpts;
use crate::config::ClientConfig;

pub struct GlobalSettings {
    config: ClientConfig,
    session_opts: SessionOpts,
    printer: Box<dyn Output>,
}

impl GlobalSettings {
    pub fn new(config: ClientConfig, session_opts: SessionOpts, printer: Box<dyn Output>) -> Self {
        GlobalSettings {
            config,
            session_opts,
            printer,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session_opts(&self) -> &SessionOpts {
        &self.session_opts
    }

    pub fn printer(&self) -> &dyn Output {
        self.printer.as_ref()
    }
}
