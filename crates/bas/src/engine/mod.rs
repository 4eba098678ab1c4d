//! Control engine
//!
//! [`EngineState`] holds every unit, schedule and setting. The
//! [`ControlLoop`] service owns the write side: each tick it applies the
//! commands queued through [`EngineHandle`], steps every unit, and drives
//! hardware-mapped units' relays over the serial link.

mod command;
mod control_loop;
mod handle;
mod state;

pub use command::StateCommand;
pub use control_loop::{CONTROL_LOOP_ID, ControlLoop, ControlOptions, TickSummary};
pub use handle::{CommandQueue, EngineHandle};
pub use state::{
    DEFAULT_SCHEDULE_ID, DEFAULT_UNIT_ID, EngineSnapshot, EngineState, SYSTEM_SOURCE,
    default_schedule, default_unit,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Control loop is not running")]
    Stopped,
}

pub type EngineResult<T> = Result<T, EngineError>;
