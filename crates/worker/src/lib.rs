//! Workers for session expiry.
//!
//! - Activity tracker (buffer, sweep, throttle, publish)
//! - Activity worker (session_logs → tracker, per partition)
//! - Expiry handler and worker (expired_sessions → hooks)
//! - Scheduler

pub mod activity;
pub mod expiry;
pub mod scheduler;
pub mod tracker;

pub use activity::*;
pub use expiry::*;
pub use scheduler::*;
pub use tracker::*;
