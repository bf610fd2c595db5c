//! Infrastructure layer: job queue, stores, reward issuer and pipeline workers.
//!
//! Stores and the job queue come in two backends: in-memory for tests and
//! development, and redb for a durable single-node deployment.

pub mod config;
pub mod database;
pub mod issuer;
pub mod jobs;
pub mod store;
pub mod workers;

mod integration_tests;
