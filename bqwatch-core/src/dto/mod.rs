//! Data Transfer Objects
//!
//! Request and query types for the bqwatch host API.

pub mod job;
