pub mod admin;
pub mod proxy;
pub mod system;
pub mod webhooks;
