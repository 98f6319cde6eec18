//! bqwatch Core
//!
//! Core types shared by the bqwatch crates.
//!
//! This crate contains:
//! - Domain types: tracked job records and the status reported by BigQuery
//! - DTOs: request bodies for the host API

pub mod domain;
pub mod dto;
