pub mod control;
pub mod info;
pub mod status;
pub mod submit;
pub mod wait;
