//! BAS - HVAC unit control engine
//!
//! This crate provides:
//! - Occupancy evaluation from weekly schedules
//! - Per-unit thermal simulation, control decisions and alarm hysteresis
//! - Modbus-RTU write-coil framing for relay boards
//! - A rate-limited, serialized serial link
//! - The periodic control loop, run as a `bas_runtime` service

// Re-export core crates
pub use bas_runtime;
pub use bas_types;

pub mod clock;
pub mod config;
pub mod controller;
pub mod engine;
pub mod link;
pub mod protocol;
pub mod schedule;
