pub mod bluetooth;
pub mod event_log;
pub mod logging;
