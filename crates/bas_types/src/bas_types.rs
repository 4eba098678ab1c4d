//! BAS Types - Core data model for the RTU control engine
//!
//! This crate contains the pure data structures shared between the control
//! loop and whatever surface reads or mutates engine state. Nothing in here
//! performs I/O; every type is serde-serialisable so snapshots can be handed
//! to a dashboard as-is.

mod audit;
mod history;
mod schedule;
mod settings;
mod unit;

pub use audit::*;
pub use history::*;
pub use schedule::*;
pub use settings::*;
pub use unit::*;
