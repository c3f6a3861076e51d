//! Scheduler layer for the runner
//!
//! This layer accepts submissions, assigns job handles and hands each job to
//! its own execution task.

pub mod dispatcher;

pub use dispatcher::{DispatchError, JobDispatcher};
