//! Data Transfer Objects
//!
//! Request and response shapes exchanged between the orchestrator API and its
//! clients.

pub mod job;
