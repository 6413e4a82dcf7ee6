//! CLI command implementations.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod request;
pub mod sign;
pub mod stream;
pub mod watch;
