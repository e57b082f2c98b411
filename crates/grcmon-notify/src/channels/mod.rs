pub mod in_app;
pub mod log;
pub mod webhook;
