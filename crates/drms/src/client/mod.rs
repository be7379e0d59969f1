pub mod commands;
pub mod globalsettings;
pub mod output;
pub mod session;
pub mod utils;
