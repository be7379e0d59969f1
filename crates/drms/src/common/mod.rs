pub mod cli;
pub mod error;
pub mod parser;
pub mod setup;
