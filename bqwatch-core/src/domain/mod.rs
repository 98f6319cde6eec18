//! Core domain types
//!
//! `job` holds the record persisted by the job store; `remote` holds what the
//! remote job API reports about a job. The poller reconciles one against the other.

pub mod job;
pub mod remote;
