//! Repository layer
//!
//! The job store is the boundary between the side that submits jobs and the
//! side that executes them. It is trait-based so the orchestrator can plug in
//! a durable store while tests use the in-memory one.

mod jobs;

pub use jobs::{InMemoryJobStore, JobStore, StoreError};
