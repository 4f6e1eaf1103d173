//! Redpanda producer and consumer for session expiry.

pub mod batch;
pub mod config;
pub mod consumer;
pub mod health;
pub mod partitioner;
pub mod producer;
pub mod topics;

pub use config::*;
pub use consumer::*;
pub use producer::*;
pub use topics::*;
