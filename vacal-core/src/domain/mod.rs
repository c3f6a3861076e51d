//! Core domain types
//!
//! This module contains the core domain structures used across the calibration
//! services. They are shared between the orchestrator (persistence and API) and
//! the runner (execution).

pub mod job;
pub mod params;
