use std::sync::Arc;

use serde::{Deserialize, Serialize};

use drmsession::SchedulerBackend;
use drmsession::backend::memory::MemoryCluster;

use crate::backend::condor::CondorBackend;
use crate::backend::local::LocalBackend;
use crate::config::ClientConfig;

pub mod common;
pub mod condor;
pub mod local;

#[derive(clap::ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// HTCondor command line tools
    Condor,
    /// Child processes on this machine
    Local,
    /// Simulated cluster that lives only inside the process
    Memory,
}

pub fn create_backend(
    kind: BackendKind,
    config: &ClientConfig,
) -> anyhow::Result<Arc<dyn SchedulerBackend>> {
    let backend: Arc<dyn SchedulerBackend> = match kind {
        BackendKind::Condor => Arc::new(CondorBackend::new(
            config.condor.bin_dir.clone(),
            config.condor.spool_dir.clone(),
        )),
        BackendKind::Local => {
            let max_running = match config.local.max_running {
                Some(0) => anyhow::bail!("local.max_running has to be at least 1"),
                Some(count) => count,
                None => std::thread::available_parallelism()
                    .map(|count| count.get())
                    .unwrap_or(1),
            };
            Arc::new(LocalBackend::new(max_running))
        }
        BackendKind::Memory => Arc::new(MemoryCluster::new().backend()),
    };
    Ok(backend)
}
