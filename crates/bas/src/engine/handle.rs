//! Cloneable handle for reading engine state and queueing changes
//!
//! Reads take a short read lock on the shared state. Mutations are queued
//! and applied by the control loop at the start of its next tick, so callers
//! never block the loop.

use std::sync::Arc;

use bas_types::{
    AuditEntry, HistorySample, OutputKey, OverrideValue, Schedule, SetpointKey, SettingsPatch,
    UnitSpec,
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{EngineError, EngineResult, EngineSnapshot, EngineState, StateCommand};

/// Receiving end of the mutation queue, owned by the control loop
pub struct CommandQueue {
    rx: mpsc::UnboundedReceiver<StateCommand>,
}

impl CommandQueue {
    /// Take every command queued so far, oldest first
    pub fn drain(&mut self) -> Vec<StateCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            commands.push(command);
        }
        commands
    }
}

#[derive(Clone)]
pub struct EngineHandle {
    state: Arc<RwLock<EngineState>>,
    commands: mpsc::UnboundedSender<StateCommand>,
}

impl EngineHandle {
    /// Wrap `state` for sharing and open its command queue
    pub fn new(state: EngineState) -> (Self, CommandQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            state: Arc::new(RwLock::new(state)),
            commands: tx,
        };
        (handle, CommandQueue { rx })
    }

    pub(crate) fn shared(&self) -> &Arc<RwLock<EngineState>> {
        &self.state
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_state(&self) -> EngineSnapshot {
        self.state.read().snapshot()
    }

    /// Recorded samples for a unit, oldest first; empty for unknown units
    pub fn get_history(&self, unit_id: &str) -> Vec<HistorySample> {
        self.state.read().history(unit_id)
    }

    /// Audit log, newest first
    pub fn get_logs(&self) -> Vec<AuditEntry> {
        self.state.read().logs()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Force an output, or release it with `None`. Unknown output keys are ignored.
    pub fn apply_override(
        &self,
        unit_id: &str,
        key: &str,
        value: Option<OverrideValue>,
    ) -> EngineResult<()> {
        let Some(key) = parse_key::<OutputKey>(key) else {
            return Ok(());
        };
        self.send(StateCommand::ApplyOverride {
            unit_id: unit_id.to_string(),
            key,
            value,
        })
    }

    /// Unknown setpoint keys are ignored
    pub fn set_setpoint(&self, unit_id: &str, key: &str, value: f64) -> EngineResult<()> {
        let Some(key) = parse_key::<SetpointKey>(key) else {
            return Ok(());
        };
        self.send(StateCommand::SetSetpoint {
            unit_id: unit_id.to_string(),
            key,
            value,
        })
    }

    pub fn set_alarm_enabled(&self, unit_id: &str, enabled: bool) -> EngineResult<()> {
        self.send(StateCommand::SetAlarmEnabled {
            unit_id: unit_id.to_string(),
            enabled,
        })
    }

    pub fn ack_alarm(&self, unit_id: &str, key: &str) -> EngineResult<()> {
        self.send(StateCommand::AckAlarm {
            unit_id: unit_id.to_string(),
            key: key.to_string(),
        })
    }

    pub fn save_schedule(&self, schedule: Schedule) -> EngineResult<()> {
        self.send(StateCommand::SaveSchedule(schedule))
    }

    pub fn update_global_settings(&self, patch: SettingsPatch) -> EngineResult<()> {
        self.send(StateCommand::UpdateGlobalSettings(patch))
    }

    /// Queue a new unit and return its id; the unit appears on the next tick
    pub fn create_unit(&self, spec: UnitSpec) -> EngineResult<String> {
        let id = format!("unit_{}", Uuid::new_v4().simple());
        self.send(StateCommand::CreateUnit {
            id: id.clone(),
            spec,
        })?;
        Ok(id)
    }

    pub fn delete_unit(&self, unit_id: &str) -> EngineResult<()> {
        self.send(StateCommand::DeleteUnit {
            unit_id: unit_id.to_string(),
        })
    }

    /// Wire an output to a relay index, or unwire it with `None`
    pub fn set_relay(&self, unit_id: &str, key: &str, relay: Option<u16>) -> EngineResult<()> {
        let Some(key) = parse_key::<OutputKey>(key) else {
            return Ok(());
        };
        self.send(StateCommand::SetRelay {
            unit_id: unit_id.to_string(),
            key,
            relay,
        })
    }

    pub fn set_hardware_mapped(&self, unit_id: &str, mapped: bool) -> EngineResult<()> {
        self.send(StateCommand::SetHardwareMapped {
            unit_id: unit_id.to_string(),
            mapped,
        })
    }

    fn send(&self, command: StateCommand) -> EngineResult<()> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::Stopped)
    }
}

fn parse_key<K>(key: &str) -> Option<K>
where
    K: std::str::FromStr,
    K::Err: std::fmt::Display,
{
    match key.parse() {
        Ok(key) => Some(key),
        Err(e) => {
            debug!(error = %e, "Ignoring command");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (EngineHandle, CommandQueue) {
        EngineHandle::new(EngineState::default_seeded())
    }

    #[test]
    fn test_mutations_are_queued_not_applied() {
        let (handle, mut queue) = handle();

        handle.set_alarm_enabled("rtu_1", false).unwrap();
        assert!(handle.get_state().unit("rtu_1").unwrap().alarms_enabled);

        let commands = queue.drain();
        assert_eq!(
            commands,
            vec![StateCommand::SetAlarmEnabled {
                unit_id: "rtu_1".to_string(),
                enabled: false,
            }]
        );
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let (handle, mut queue) = handle();

        handle
            .apply_override("rtu_1", "compressor", Some(OverrideValue::Switch(true)))
            .unwrap();
        handle.set_setpoint("rtu_1", "supply_air", 55.0).unwrap();
        handle.set_relay("rtu_1", "pump", Some(4)).unwrap();

        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_create_unit_returns_id_immediately() {
        let (handle, mut queue) = handle();

        let id = handle.create_unit(UnitSpec::new("AHU-2")).unwrap();
        assert!(id.starts_with("unit_"));

        let commands = queue.drain();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].unit_id(), Some(id.as_str()));
    }

    #[test]
    fn test_alarm_ack_and_schedule_save_are_queued() {
        let (handle, mut queue) = handle();
        let weekend = Schedule::every_day("sch_weekend", "Weekend", "10:00", "14:00");

        handle.ack_alarm("rtu_1", "high_temp").unwrap();
        handle.save_schedule(weekend.clone()).unwrap();

        let commands = queue.drain();
        assert_eq!(commands[0].unit_id(), Some("rtu_1"));
        assert_eq!(commands[1], StateCommand::SaveSchedule(weekend));
        assert_eq!(commands[1].unit_id(), None);
    }

    #[test]
    fn test_commands_preserve_order() {
        let (handle, mut queue) = handle();

        handle.set_setpoint("rtu_1", "occ_cool", 70.0).unwrap();
        handle.set_setpoint("rtu_1", "occ_cool", 71.0).unwrap();

        let commands = queue.drain();
        assert!(matches!(
            commands[1],
            StateCommand::SetSetpoint { value, .. } if value == 71.0
        ));
    }

    #[test]
    fn test_send_after_queue_dropped_fails() {
        let (handle, queue) = handle();
        drop(queue);

        assert!(matches!(handle.delete_unit("rtu_1"), Err(EngineError::Stopped)));
    }

    #[test]
    fn test_history_for_unknown_unit_is_empty() {
        let (handle, _queue) = handle();
        assert!(handle.get_history("ghost").is_empty());
        assert!(handle.get_logs().is_empty());
    }
}
