#![deny(clippy::await_holding_lock)]

#[macro_use]
pub mod common;

pub mod attributes;
pub mod backend;
pub mod contact;
pub mod jobid;
pub mod outcome;
pub mod placeholders;
pub mod session;
pub mod status;
pub mod template;
pub mod wait;

#[cfg(test)]
mod tests;

pub use crate::attributes::{AttributeStore, AttributeValue, TemplateView};
pub use crate::backend::{ControlAction, SchedulerBackend};
pub use crate::common::{Map, Set, WrappedArcMutex};
pub use crate::contact::ContactString;
pub use crate::jobid::{BulkJobId, BulkRange, JobId, JobIdentifier};
pub use crate::outcome::{JobOutcome, Termination};
pub use crate::session::{Session, SessionConfig, SessionConfigBuilder, SessionState, Version};
pub use crate::status::{JobStatus, StatusCode};
pub use crate::template::TemplateId;
pub use crate::wait::Timeout;

pub type Error = common::error::DrmsError;
pub type Result<T> = std::result::Result<T, Error>;

pub const DRMS_VERSION: &str = env!("CARGO_PKG_VERSION");
