//! chatrelay - streaming chat relay with quota accounting
//!
//! This crate relays chat requests received over a WebSocket to a streaming
//! completion provider, forwarding the incremental output back to the client
//! while debiting a prepaid quota, moderating the streamed text and failing
//! over from a primary to a fallback provider.

pub mod admin;
pub mod config;
pub mod error;
pub mod provider;
pub mod relay;
pub mod server;
pub mod services;
pub mod testing;

pub use error::RelayError;
