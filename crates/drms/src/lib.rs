pub mod backend;
pub mod client;
pub mod common;
pub mod config;

pub type Error = crate::common::error::ClientError;
pub type Result<T> = std::result::Result<T, Error>;

// Reexports
pub use drmsession;

pub const DRMS_VERSION: &str = env!("CARGO_PKG_VERSION");
