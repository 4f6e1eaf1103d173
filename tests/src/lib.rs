//! Shared harness for end-to-end tests without a broker.

pub mod fixtures;
pub mod mocks;
pub mod setup;
