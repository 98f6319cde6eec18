//! Scheduler module
//!
//! Background reconciliation of tracked jobs against BigQuery.

pub mod poller;

pub use poller::JobPoller;
