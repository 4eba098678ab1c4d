//! BAS Runtime - Service lifecycle for long-running engine components
//!
//! The control loop and any auxiliary workers run as services: each one gets
//! its own task, a fixed tick period and a shared event bus.

pub mod service;

pub use service::*;
