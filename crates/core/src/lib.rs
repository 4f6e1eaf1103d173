//! Core types for session expiry detection.
//!
//! Pure, I/O-free building blocks:
//! - Activity and expiry event types with time normalization
//! - Per-session earliest-activity buffer with inactivity sweep
//! - Emission throttle gate
//! - Injectable clock

pub mod buffer;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod throttle;

pub use buffer::*;
pub use clock::*;
pub use config::*;
pub use error::{Error, Result};
pub use events::*;
pub use throttle::*;
