//! Service layer
//!
//! Services contain the execution logic of the runner: launching the
//! calibration script, persisting its output into the job log, and serving
//! that log to readers while the job is still running.

mod execution;
mod log_sink;
mod log_tail;

pub use execution::{CommandLine, ProcessRunner};
pub use log_sink::{LogHeader, LogSink};
pub use log_tail::{LogStream, LogTailer, TailError};
