//! Mutations queued by callers and applied at the start of a tick

use bas_types::{OutputKey, OverrideValue, Schedule, SetpointKey, SettingsPatch, UnitSpec};

#[derive(Debug, Clone, PartialEq)]
pub enum StateCommand {
    /// Force an output (`Some`) or release it (`None`)
    ApplyOverride {
        unit_id: String,
        key: OutputKey,
        value: Option<OverrideValue>,
    },
    SetSetpoint {
        unit_id: String,
        key: SetpointKey,
        value: f64,
    },
    SetAlarmEnabled {
        unit_id: String,
        enabled: bool,
    },
    AckAlarm {
        unit_id: String,
        key: String,
    },
    /// Insert or replace a schedule by id
    SaveSchedule(Schedule),
    UpdateGlobalSettings(SettingsPatch),
    CreateUnit {
        id: String,
        spec: UnitSpec,
    },
    DeleteUnit {
        unit_id: String,
    },
    /// Wire (`Some`) or unwire (`None`) an output to a relay index
    SetRelay {
        unit_id: String,
        key: OutputKey,
        relay: Option<u16>,
    },
    SetHardwareMapped {
        unit_id: String,
        mapped: bool,
    },
}

impl StateCommand {
    /// Unit this command targets, if any
    pub fn unit_id(&self) -> Option<&str> {
        match self {
            StateCommand::ApplyOverride { unit_id, .. }
            | StateCommand::SetSetpoint { unit_id, .. }
            | StateCommand::SetAlarmEnabled { unit_id, .. }
            | StateCommand::AckAlarm { unit_id, .. }
            | StateCommand::DeleteUnit { unit_id }
            | StateCommand::SetRelay { unit_id, .. }
            | StateCommand::SetHardwareMapped { unit_id, .. } => Some(unit_id),
            StateCommand::CreateUnit { id, .. } => Some(id),
            StateCommand::SaveSchedule(_) | StateCommand::UpdateGlobalSettings(_) => None,
        }
    }
}
