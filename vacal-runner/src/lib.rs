//! VA Calibration Runner
//!
//! Asynchronous execution of calibration jobs.
//!
//! Architecture:
//! - Configuration: interpreter, script and log locations, timeouts, poll interval
//! - Repository: the job store capability holding job records
//! - Services: process execution, the per-job log sink and live log tailing
//! - Scheduler: the dispatcher that validates submissions and launches runs
//!
//! A submitted job gets its log file and a pending record immediately; the
//! calibration script then runs in its own task, streaming output into the log
//! while any number of readers tail it.

pub mod config;
pub mod repository;
pub mod scheduler;
pub mod service;

pub use config::RunnerConfig;
pub use repository::{InMemoryJobStore, JobStore, StoreError};
pub use scheduler::{DispatchError, JobDispatcher};
pub use service::{LogSink, LogStream, LogTailer, ProcessRunner, TailError};
