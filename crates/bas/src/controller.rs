//! Per-unit control step
//!
//! One call to [`step_unit`] runs a unit through a full tick in fixed order:
//! occupancy, thermal simulation, setpoint selection, demand, emergency stop,
//! output assignment, overrides, history, alarm hysteresis.
//!
//! The thermal step reads the outputs applied on the *previous* tick (one
//! tick of thermal lag); the freshly computed outputs only replace them once
//! the decision is complete.

use bas_types::{ActiveSetpoints, HistorySample, OutputOverrides, Setpoints, Unit, UnitMode, UnitOutputs};
use chrono::{DateTime, Utc};

/// Passive temperature gain per tick
pub const PASSIVE_DRIFT: f64 = 0.05;
/// Temperature change per tick while cooling was on
pub const COOLING_EFFECT: f64 = -0.3;
/// Temperature change per tick while heating was on
pub const HEATING_EFFECT: f64 = 0.4;
/// Degrees past a setpoint before demand is raised
pub const DEMAND_BAND: f64 = 1.0;
/// Damper position while the fan runs
pub const DAMPER_OPEN: u8 = 20;

pub const HIGH_TEMP_ALARM: &str = "high_temp";
pub const HIGH_TEMP_MESSAGE: &str = "High Temp Alarm (>85F)";
/// Alarm raises strictly above this temperature
pub const HIGH_TEMP_RAISE: f64 = 85.0;
/// Alarm clears strictly below this temperature
pub const HIGH_TEMP_CLEAR: f64 = 84.0;

/// Site-wide inputs shared by every unit in a tick
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    pub occupied: bool,
    pub emergency_stop: bool,
    pub now: DateTime<Utc>,
}

/// Everything the control logic decided for a unit this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlDecision {
    pub setpoints: ActiveSetpoints,
    pub request_cool: bool,
    pub request_heat: bool,
    pub request_fan: bool,
    pub mode: UnitMode,
    /// Outputs from the control logic alone
    pub computed: UnitOutputs,
    /// Outputs after overrides, as driven to hardware
    pub applied: UnitOutputs,
}

impl ControlDecision {
    /// Setpoint recorded in history: cooling setpoint while cooling, else heating
    pub fn trend_setpoint(&self) -> f64 {
        if self.request_cool {
            self.setpoints.cool
        } else {
            self.setpoints.heat
        }
    }

    /// Output demand recorded in history
    pub fn trend_output(&self) -> u8 {
        if self.request_cool || self.request_heat {
            100
        } else {
            0
        }
    }
}

/// Alarm state change produced by a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmTransition {
    None,
    Raised,
    Cleared,
}

/// Result of stepping one unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// Outputs that were in force during the previous tick
    pub previous: UnitOutputs,
    pub decision: ControlDecision,
    pub alarm: AlarmTransition,
}

/// Next simulated temperature given the outputs of the previous tick.
///
/// Computed in hundredths and rounded half-up to one decimal, so a
/// half-tenth result always rounds the same way.
pub fn simulate_temperature(temperature: f64, previous: &UnitOutputs) -> f64 {
    let mut change = PASSIVE_DRIFT;
    if previous.cool {
        change += COOLING_EFFECT;
    }
    if previous.heat {
        change += HEATING_EFFECT;
    }
    let hundredths = (temperature * 100.0).round() as i64 + (change * 100.0).round() as i64;
    (hundredths + 5).div_euclid(10) as f64 / 10.0
}

/// Mode for a set of requests; cool wins over heat, heat over fan
pub fn select_mode(request_cool: bool, request_heat: bool, request_fan: bool, emergency_stop: bool) -> UnitMode {
    if emergency_stop {
        UnitMode::EmergencyStop
    } else if request_cool {
        UnitMode::Cooling
    } else if request_heat {
        UnitMode::Heating
    } else if request_fan {
        UnitMode::FanOnly
    } else {
        UnitMode::Off
    }
}

/// Compute demand, mode and outputs for a unit at `temperature`.
///
/// Demand has a one-sided band and no falling-edge hysteresis: a unit
/// sitting on the threshold can toggle every tick.
pub fn decide(
    temperature: f64,
    occupied: bool,
    setpoints: &Setpoints,
    emergency_stop: bool,
    overrides: &OutputOverrides,
) -> ControlDecision {
    let active = setpoints.active(occupied);

    let mut request_cool = temperature > active.cool + DEMAND_BAND;
    // Cooling takes priority, so both stages never run together
    let mut request_heat = !request_cool && temperature < active.heat - DEMAND_BAND;
    let mut request_fan = occupied || request_cool || request_heat;

    let mode = select_mode(request_cool, request_heat, request_fan, emergency_stop);
    if emergency_stop {
        request_cool = false;
        request_heat = false;
        request_fan = false;
    }

    let computed = UnitOutputs {
        fan: request_fan,
        cool: request_cool,
        heat: request_heat,
        damper: if request_fan { DAMPER_OPEN } else { 0 },
    };

    ControlDecision {
        setpoints: active,
        request_cool,
        request_heat,
        request_fan,
        mode,
        computed,
        // Overrides are merged last, so they hold even under emergency stop
        applied: computed.with_overrides(overrides),
    }
}

/// Apply the high-temperature hysteresis band to a unit's alarms
pub fn evaluate_alarm(unit: &mut Unit, now: DateTime<Utc>) -> AlarmTransition {
    if !unit.alarms_enabled {
        return AlarmTransition::None;
    }

    if unit.temperature > HIGH_TEMP_RAISE {
        if unit.raise_alarm(HIGH_TEMP_ALARM, HIGH_TEMP_MESSAGE, now) {
            return AlarmTransition::Raised;
        }
    } else if unit.temperature < HIGH_TEMP_CLEAR && unit.clear_alarm(HIGH_TEMP_ALARM) {
        return AlarmTransition::Cleared;
    }

    AlarmTransition::None
}

/// Run one control tick for `unit`
pub fn step_unit(unit: &mut Unit, ctx: &TickContext) -> StepOutcome {
    unit.occupied = ctx.occupied;

    let previous = unit.outputs;
    unit.temperature = simulate_temperature(unit.temperature, &previous);

    let decision = decide(
        unit.temperature,
        unit.occupied,
        &unit.setpoints,
        ctx.emergency_stop,
        &unit.overrides,
    );
    unit.mode = decision.mode;
    unit.outputs = decision.applied;

    unit.history.push(HistorySample {
        timestamp: ctx.now,
        temperature: unit.temperature,
        setpoint: decision.trend_setpoint(),
        output: decision.trend_output(),
    });

    let alarm = evaluate_alarm(unit, ctx.now);

    StepOutcome {
        previous,
        decision,
        alarm,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
