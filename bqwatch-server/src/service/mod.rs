//! Service Module
//!
//! Business logic behind the HTTP API.

pub mod job;

pub use job as job_service;
