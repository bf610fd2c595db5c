//! `questline-auth`: authenticity checks for inbound platform traffic.
//!
//! This crate is intentionally decoupled from HTTP: callers hand in raw bytes
//! and header values and get an accept/reject decision back.

pub mod proxy;
pub mod webhook;

pub use proxy::{ProxyParams, canonical_proxy_message};
pub use webhook::{SignatureError, WebhookVerifier};
