//! Repository Module
//!
//! Durable storage for the orchestrator.

pub mod job;

pub use job::PgJobStore;
