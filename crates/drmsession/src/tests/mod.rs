mod test_session;
pub mod utils;
