//! HTTP API: webhook ingestion, app proxy and admin surface.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
