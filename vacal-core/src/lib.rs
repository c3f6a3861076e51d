//! VA Calibration Core
//!
//! Core types and abstractions shared by the calibration services.
//!
//! This crate contains:
//! - Domain types: jobs, their lifecycle states and the calibration parameters
//! - Result extraction: parsing of the structured block a calibration run prints
//! - DTOs: Data transfer objects for the HTTP API

pub mod domain;
pub mod dto;
pub mod sentinel;
