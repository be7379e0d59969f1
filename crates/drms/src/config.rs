use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::common::error::ClientError;

const CONFIG_DIR_NAME: &str = "drms";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Client configuration loaded from a TOML file.
///
/// ```toml
/// backend = "condor"
/// contact = "session=analysis"
/// poll_interval = "10s"
///
/// [condor]
/// bin_dir = "/opt/condor/bin"
///
/// [local]
/// max_running = 4
/// ```
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub backend: Option<BackendKind>,
    pub contact: Option<String>,
    /// Humantime duration, e.g. `5s`.
    pub poll_interval: Option<String>,
    pub condor: CondorConfig,
    pub local: LocalConfig,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CondorConfig {
    /// Directory with the Condor command line tools. `PATH` is used when missing.
    pub bin_dir: Option<PathBuf>,
    /// Directory for submit descriptions and job logs.
    pub spool_dir: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LocalConfig {
    /// Maximum number of concurrently running jobs. Defaults to the number of CPUs.
    pub max_running: Option<usize>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl ClientConfig {
    pub fn parse(text: &str) -> crate::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            ClientError::ConfigError(format!("Cannot read {}: {error}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Loads the configuration from `path`, or from the default location if no path is given.
    /// A missing file at the default location results in the default configuration.
    pub fn load_or_default(path: Option<&Path>) -> crate::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match default_config_path() {
                Some(path) if path.is_file() => {
                    log::debug!("Loading configuration from {}", path.display());
                    Self::load(&path)
                }
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn poll_interval(&self) -> crate::Result<Option<Duration>> {
        self.poll_interval
            .as_deref()
            .map(|value| {
                humantime::parse_duration(value).map_err(|error| {
                    ClientError::ConfigError(format!("Invalid poll interval `{value}`: {error}"))
                })
            })
            .transpose()
    }
}
