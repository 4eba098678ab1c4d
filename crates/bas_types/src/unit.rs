//! Terminal unit (RTU) model
//!
//! A unit carries its thermal state, the outputs applied on the last control
//! tick, a sparse override record of the same shape, alarms, trend history
//! and the relay wiring used when it is mapped to physical hardware.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::History;

// ─────────────────────────────────────────────────────────────────────────────
// Keys
// ─────────────────────────────────────────────────────────────────────────────

/// A key string did not name a known output or setpoint
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} key: {key}")]
pub struct ParseKeyError {
    pub kind: &'static str,
    pub key: String,
}

/// Controllable output point of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKey {
    Fan,
    Cool,
    Heat,
    Damper,
}

impl OutputKey {
    /// Binary outputs in the order they are written to a relay board
    pub const SWITCHED: [OutputKey; 3] = [OutputKey::Fan, OutputKey::Cool, OutputKey::Heat];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKey::Fan => "fan",
            OutputKey::Cool => "cool",
            OutputKey::Heat => "heat",
            OutputKey::Damper => "damper",
        }
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fan" => Ok(OutputKey::Fan),
            "cool" => Ok(OutputKey::Cool),
            "heat" => Ok(OutputKey::Heat),
            "damper" => Ok(OutputKey::Damper),
            other => Err(ParseKeyError {
                kind: "output",
                key: other.to_string(),
            }),
        }
    }
}

/// One of the four configured setpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetpointKey {
    OccCool,
    OccHeat,
    UnoccCool,
    UnoccHeat,
}

impl FromStr for SetpointKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "occ_cool" => Ok(SetpointKey::OccCool),
            "occ_heat" => Ok(SetpointKey::OccHeat),
            "unocc_cool" => Ok(SetpointKey::UnoccCool),
            "unocc_heat" => Ok(SetpointKey::UnoccHeat),
            other => Err(ParseKeyError {
                kind: "setpoint",
                key: other.to_string(),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outputs & Overrides
// ─────────────────────────────────────────────────────────────────────────────

/// Output values of a unit for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutputs {
    pub fan: bool,
    pub cool: bool,
    pub heat: bool,
    /// Damper position, 0-100 %
    pub damper: u8,
}

impl UnitOutputs {
    /// Binary state of an output; the damper counts as on when open at all
    pub fn is_on(&self, key: OutputKey) -> bool {
        match key {
            OutputKey::Fan => self.fan,
            OutputKey::Cool => self.cool,
            OutputKey::Heat => self.heat,
            OutputKey::Damper => self.damper > 0,
        }
    }

    /// Merge an override record over these outputs; present fields win
    pub fn with_overrides(mut self, overrides: &OutputOverrides) -> Self {
        if let Some(fan) = overrides.fan {
            self.fan = fan;
        }
        if let Some(cool) = overrides.cool {
            self.cool = cool;
        }
        if let Some(heat) = overrides.heat {
            self.heat = heat;
        }
        if let Some(damper) = overrides.damper {
            self.damper = damper;
        }
        self
    }
}

/// Value forced onto an output by an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OverrideValue {
    Switch(bool),
    Percent(u8),
}

impl OverrideValue {
    fn as_switch(self) -> bool {
        match self {
            OverrideValue::Switch(on) => on,
            OverrideValue::Percent(p) => p > 0,
        }
    }

    fn as_percent(self) -> u8 {
        match self {
            OverrideValue::Switch(true) => 100,
            OverrideValue::Switch(false) => 0,
            OverrideValue::Percent(p) => p.min(100),
        }
    }
}

/// Sparse override record, same shape as [`UnitOutputs`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cool: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damper: Option<u8>,
}

impl OutputOverrides {
    /// Set (`Some`) or clear (`None`) the override for one output.
    ///
    /// Mismatched value kinds are coerced: a percent on a switch is on when
    /// non-zero, a switch on the damper is 100 or 0.
    pub fn set(&mut self, key: OutputKey, value: Option<OverrideValue>) {
        match key {
            OutputKey::Fan => self.fan = value.map(OverrideValue::as_switch),
            OutputKey::Cool => self.cool = value.map(OverrideValue::as_switch),
            OutputKey::Heat => self.heat = value.map(OverrideValue::as_switch),
            OutputKey::Damper => self.damper = value.map(OverrideValue::as_percent),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Relay index wired to each output of a hardware-mapped unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cool: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damper: Option<u16>,
}

impl RelayMap {
    pub fn get(&self, key: OutputKey) -> Option<u16> {
        match key {
            OutputKey::Fan => self.fan,
            OutputKey::Cool => self.cool,
            OutputKey::Heat => self.heat,
            OutputKey::Damper => self.damper,
        }
    }

    pub fn set(&mut self, key: OutputKey, relay: Option<u16>) {
        match key {
            OutputKey::Fan => self.fan = relay,
            OutputKey::Cool => self.cool = relay,
            OutputKey::Heat => self.heat = relay,
            OutputKey::Damper => self.damper = relay,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Setpoints & Mode
// ─────────────────────────────────────────────────────────────────────────────

/// Occupied/unoccupied cooling and heating setpoints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Setpoints {
    pub occ_cool: f64,
    pub occ_heat: f64,
    pub unocc_cool: f64,
    pub unocc_heat: f64,
}

impl Default for Setpoints {
    fn default() -> Self {
        Self {
            occ_cool: 74.0,
            occ_heat: 68.0,
            unocc_cool: 80.0,
            unocc_heat: 60.0,
        }
    }
}

/// The cooling/heating pair in force for the current occupancy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSetpoints {
    pub cool: f64,
    pub heat: f64,
}

impl Setpoints {
    pub fn active(&self, occupied: bool) -> ActiveSetpoints {
        if occupied {
            ActiveSetpoints {
                cool: self.occ_cool,
                heat: self.occ_heat,
            }
        } else {
            ActiveSetpoints {
                cool: self.unocc_cool,
                heat: self.unocc_heat,
            }
        }
    }

    pub fn set(&mut self, key: SetpointKey, value: f64) {
        match key {
            SetpointKey::OccCool => self.occ_cool = value,
            SetpointKey::OccHeat => self.occ_heat = value,
            SetpointKey::UnoccCool => self.unocc_cool = value,
            SetpointKey::UnoccHeat => self.unocc_heat = value,
        }
    }
}

/// Operating state derived from a tick's control decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitMode {
    #[default]
    Off,
    FanOnly,
    Cooling,
    Heating,
    EmergencyStop,
}

impl fmt::Display for UnitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitMode::Off => write!(f, "OFF"),
            UnitMode::FanOnly => write!(f, "FAN_ONLY"),
            UnitMode::Cooling => write!(f, "COOLING"),
            UnitMode::Heating => write!(f, "HEATING"),
            UnitMode::EmergencyStop => write!(f, "EMERGENCY_STOP"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Alarms
// ─────────────────────────────────────────────────────────────────────────────

/// An active alarm on a unit; keys are unique per unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub key: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    pub acknowledged: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for creating a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    #[serde(rename = "type", default = "default_unit_type")]
    pub unit_type: String,
    #[serde(default)]
    pub hardware_mapped: bool,
    #[serde(default)]
    pub relays: RelayMap,
}

fn default_unit_type() -> String {
    "RTU".to_string()
}

impl UnitSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit_type: default_unit_type(),
            hardware_mapped: false,
            relays: RelayMap::default(),
        }
    }
}

/// One controlled terminal unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub unit_type: String,
    /// Zone temperature, one decimal resolution
    pub temperature: f64,
    pub setpoints: Setpoints,
    /// Outputs applied on the most recent tick (overrides included)
    pub outputs: UnitOutputs,
    #[serde(default)]
    pub overrides: OutputOverrides,
    pub mode: UnitMode,
    pub occupied: bool,
    pub alarms_enabled: bool,
    #[serde(default)]
    pub alarms: Vec<Alarm>,
    #[serde(default)]
    pub history: History,
    /// Whether this unit's outputs are written to the relay board
    #[serde(default)]
    pub hardware_mapped: bool,
    #[serde(default)]
    pub relays: RelayMap,
}

impl Unit {
    /// Create a unit with default setpoints at 72.0 degrees
    pub fn new(id: impl Into<String>, spec: UnitSpec) -> Self {
        Self {
            id: id.into(),
            name: spec.name,
            unit_type: spec.unit_type,
            temperature: 72.0,
            setpoints: Setpoints::default(),
            outputs: UnitOutputs::default(),
            overrides: OutputOverrides::default(),
            mode: UnitMode::Off,
            occupied: false,
            alarms_enabled: true,
            alarms: Vec::new(),
            history: History::default(),
            hardware_mapped: spec.hardware_mapped,
            relays: spec.relays,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_setpoints(mut self, setpoints: Setpoints) -> Self {
        self.setpoints = setpoints;
        self
    }

    pub fn with_outputs(mut self, outputs: UnitOutputs) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = History::with_capacity(capacity);
        self
    }

    /// Active alarm with the given key
    pub fn alarm(&self, key: &str) -> Option<&Alarm> {
        self.alarms.iter().find(|a| a.key == key)
    }

    /// Raise an alarm unless one with the same key is already active.
    /// Returns true if a new alarm was added.
    pub fn raise_alarm(
        &mut self,
        key: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.alarm(key).is_some() {
            return false;
        }
        self.alarms.push(Alarm {
            key: key.to_string(),
            message: message.into(),
            raised_at: now,
            acknowledged: false,
        });
        true
    }

    /// Remove the alarm with the given key. Returns true if one was removed.
    pub fn clear_alarm(&mut self, key: &str) -> bool {
        let before = self.alarms.len();
        self.alarms.retain(|a| a.key != key);
        self.alarms.len() < before
    }

    /// Mark the alarm acknowledged. Returns false if no such alarm is active.
    pub fn acknowledge_alarm(&mut self, key: &str) -> bool {
        match self.alarms.iter_mut().find(|a| a.key == key) {
            Some(alarm) => {
                alarm.acknowledged = true;
                true
            }
            None => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_key_parsing() {
        assert_eq!("fan".parse::<OutputKey>(), Ok(OutputKey::Fan));
        assert_eq!("damper".parse::<OutputKey>(), Ok(OutputKey::Damper));

        let err = "pump".parse::<OutputKey>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown output key: pump");
    }

    #[test]
    fn test_overrides_merge_over_outputs() {
        let computed = UnitOutputs {
            fan: false,
            cool: true,
            heat: false,
            damper: 0,
        };
        let mut overrides = OutputOverrides::default();
        overrides.set(OutputKey::Fan, Some(OverrideValue::Switch(true)));
        overrides.set(OutputKey::Cool, Some(OverrideValue::Switch(false)));

        let applied = computed.with_overrides(&overrides);
        assert!(applied.fan);
        assert!(!applied.cool);
        assert!(!applied.heat);

        overrides.set(OutputKey::Fan, None);
        overrides.set(OutputKey::Cool, None);
        assert!(overrides.is_empty());
        assert_eq!(computed.with_overrides(&overrides), computed);
    }

    #[test]
    fn test_override_value_coercion() {
        let mut overrides = OutputOverrides::default();
        overrides.set(OutputKey::Heat, Some(OverrideValue::Percent(40)));
        overrides.set(OutputKey::Damper, Some(OverrideValue::Switch(true)));

        assert_eq!(overrides.heat, Some(true));
        assert_eq!(overrides.damper, Some(100));
    }

    #[test]
    fn test_override_value_untagged_json() {
        let on: OverrideValue = serde_json::from_str("true").unwrap();
        let pct: OverrideValue = serde_json::from_str("35").unwrap();
        assert_eq!(on, OverrideValue::Switch(true));
        assert_eq!(pct, OverrideValue::Percent(35));
    }

    #[test]
    fn test_alarm_raise_is_idempotent() {
        let mut unit = Unit::new("u1", UnitSpec::new("Unit 1"));
        let now = Utc::now();

        assert!(unit.raise_alarm("high_temp", "hot", now));
        assert!(!unit.raise_alarm("high_temp", "hot again", now));
        assert_eq!(unit.alarms.len(), 1);
        assert_eq!(unit.alarm("high_temp").unwrap().message, "hot");

        assert!(unit.acknowledge_alarm("high_temp"));
        assert!(unit.alarm("high_temp").unwrap().acknowledged);

        assert!(unit.clear_alarm("high_temp"));
        assert!(!unit.clear_alarm("high_temp"));
        assert!(!unit.acknowledge_alarm("high_temp"));
    }

    #[test]
    fn test_active_setpoints_follow_occupancy() {
        let setpoints = Setpoints::default();
        assert_eq!(setpoints.active(true).cool, 74.0);
        assert_eq!(setpoints.active(false).heat, 60.0);
    }

    #[test]
    fn test_unit_mode_serializes_screaming_snake() {
        let json = serde_json::to_string(&UnitMode::EmergencyStop).unwrap();
        assert_eq!(json, "\"EMERGENCY_STOP\"");
        assert_eq!(UnitMode::FanOnly.to_string(), "FAN_ONLY");
    }
}
