//! Owned engine state: units, schedules, settings and the audit log

use std::collections::BTreeMap;

use bas_types::{
    AuditEntry, AuditKind, AuditLog, GlobalSettings, HistorySample, RelayMap, Schedule, Setpoints,
    Unit, UnitOutputs, UnitSpec, DEFAULT_AUDIT_CAPACITY, DEFAULT_HISTORY_CAPACITY,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::StateCommand;
use crate::controller::DAMPER_OPEN;

pub const DEFAULT_SCHEDULE_ID: &str = "sch_default";
pub const DEFAULT_UNIT_ID: &str = "rtu_1";
/// Audit source for site-wide entries
pub const SYSTEM_SOURCE: &str = "System";

/// Point-in-time copy of the engine state for readers
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub units: Vec<Unit>,
    pub schedules: Vec<Schedule>,
    pub settings: GlobalSettings,
    pub occupied: bool,
    pub started_at: DateTime<Utc>,
}

impl EngineSnapshot {
    pub fn unit(&self, id: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }
}

/// Everything the control loop owns
#[derive(Debug, Clone)]
pub struct EngineState {
    pub units: BTreeMap<String, Unit>,
    pub schedules: BTreeMap<String, Schedule>,
    pub settings: GlobalSettings,
    /// Occupancy from the most recent tick
    pub occupied: bool,
    pub audit: AuditLog,
    pub started_at: DateTime<Utc>,
    history_capacity: usize,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_AUDIT_CAPACITY)
    }
}

impl EngineState {
    /// Empty state: no units, no schedules
    pub fn new(history_capacity: usize, audit_capacity: usize) -> Self {
        Self {
            units: BTreeMap::new(),
            schedules: BTreeMap::new(),
            settings: GlobalSettings::default(),
            occupied: false,
            audit: AuditLog::with_capacity(audit_capacity),
            started_at: Utc::now(),
            history_capacity,
        }
    }

    /// State with the standard office schedule and the server room RTU
    pub fn seeded(history_capacity: usize, audit_capacity: usize) -> Self {
        let mut state = Self::new(history_capacity, audit_capacity);
        state.insert_schedule(default_schedule());
        state.insert_unit(default_unit());
        state
    }

    pub fn default_seeded() -> Self {
        Self::seeded(DEFAULT_HISTORY_CAPACITY, DEFAULT_AUDIT_CAPACITY)
    }

    pub fn insert_unit(&mut self, unit: Unit) {
        let unit = if unit.history.capacity() == self.history_capacity {
            unit
        } else {
            let samples = unit.history.to_vec();
            let mut unit = unit.with_history_capacity(self.history_capacity);
            samples.into_iter().for_each(|s| unit.history.push(s));
            unit
        };
        self.units.insert(unit.id.clone(), unit);
    }

    pub fn insert_schedule(&mut self, schedule: Schedule) {
        self.schedules.insert(schedule.id.clone(), schedule);
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            units: self.units.values().cloned().collect(),
            schedules: self.schedules.values().cloned().collect(),
            settings: self.settings.clone(),
            occupied: self.occupied,
            started_at: self.started_at,
        }
    }

    pub fn history(&self, unit_id: &str) -> Vec<HistorySample> {
        self.units
            .get(unit_id)
            .map(|u| u.history.to_vec())
            .unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }

    /// Apply one queued mutation. References to unknown units are ignored.
    pub fn apply(&mut self, command: StateCommand, now: DateTime<Utc>) {
        match command {
            StateCommand::SaveSchedule(schedule) => {
                info!(schedule_id = %schedule.id, "Schedule saved");
                self.insert_schedule(schedule);
            }
            StateCommand::UpdateGlobalSettings(patch) => {
                let was_stopped = self.settings.emergency_stop;
                patch.apply_to(&mut self.settings);
                if self.settings.emergency_stop != was_stopped {
                    let message = if self.settings.emergency_stop {
                        "Emergency Stop Engaged"
                    } else {
                        "Emergency Stop Released"
                    };
                    warn!(emergency_stop = self.settings.emergency_stop, "{}", message);
                    self.audit.record(AuditKind::Audit, SYSTEM_SOURCE, message, now);
                }
            }
            StateCommand::CreateUnit { id, spec } => {
                if self.units.contains_key(&id) {
                    debug!(unit_id = %id, "Unit already exists, ignoring create");
                    return;
                }
                let unit = Unit::new(id.clone(), spec).with_history_capacity(self.history_capacity);
                info!(unit_id = %id, name = %unit.name, "Unit created");
                self.audit.record(
                    AuditKind::Audit,
                    SYSTEM_SOURCE,
                    format!("Unit Created: {}", unit.name),
                    now,
                );
                self.units.insert(id, unit);
            }
            StateCommand::DeleteUnit { unit_id } => match self.units.remove(&unit_id) {
                Some(unit) => {
                    info!(unit_id = %unit_id, "Unit deleted");
                    self.audit.record(
                        AuditKind::Audit,
                        SYSTEM_SOURCE,
                        format!("Unit Deleted: {}", unit.name),
                        now,
                    );
                }
                None => debug!(unit_id = %unit_id, "Delete for unknown unit ignored"),
            },
            command => self.apply_to_unit(command),
        }
    }

    fn apply_to_unit(&mut self, command: StateCommand) {
        let Some(unit) = command.unit_id().and_then(|id| self.units.get_mut(id)) else {
            debug!(command = ?command, "Command for unknown unit ignored");
            return;
        };

        match command {
            StateCommand::ApplyOverride { key, value, .. } => {
                debug!(unit_id = %unit.id, output = %key, value = ?value, "Override updated");
                unit.overrides.set(key, value);
            }
            StateCommand::SetSetpoint { key, value, .. } => unit.setpoints.set(key, value),
            StateCommand::SetAlarmEnabled { enabled, .. } => unit.alarms_enabled = enabled,
            StateCommand::AckAlarm { key, .. } => {
                if !unit.acknowledge_alarm(&key) {
                    debug!(unit_id = %unit.id, alarm = %key, "Ack for inactive alarm ignored");
                }
            }
            StateCommand::SetRelay { key, relay, .. } => unit.relays.set(key, relay),
            StateCommand::SetHardwareMapped { mapped, .. } => unit.hardware_mapped = mapped,
            StateCommand::SaveSchedule(_)
            | StateCommand::UpdateGlobalSettings(_)
            | StateCommand::CreateUnit { .. }
            | StateCommand::DeleteUnit { .. } => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Seed data
// ─────────────────────────────────────────────────────────────────────────────

/// Standard office hours, every day
pub fn default_schedule() -> Schedule {
    Schedule::every_day(DEFAULT_SCHEDULE_ID, "Standard Office", "08:00", "18:00")
}

/// The server room RTU wired to the relay board
pub fn default_unit() -> Unit {
    let mut spec = UnitSpec::new("RTU-1 (Server Room)");
    spec.hardware_mapped = true;
    spec.relays = RelayMap {
        fan: Some(0),
        cool: Some(1),
        heat: Some(2),
        damper: Some(3),
    };

    Unit::new(DEFAULT_UNIT_ID, spec)
        .with_temperature(74.5)
        .with_setpoints(Setpoints {
            occ_cool: 72.0,
            occ_heat: 68.0,
            unocc_cool: 85.0,
            unocc_heat: 60.0,
        })
        .with_outputs(UnitOutputs {
            damper: DAMPER_OPEN,
            ..Default::default()
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
