//! Site-wide control settings

use serde::{Deserialize, Serialize};

/// Operating mode tag for the whole site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemMode {
    #[default]
    Live,
    Demo,
    Install,
}

/// Global settings applied to every unit each tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Forces every unit's computed outputs off
    pub emergency_stop: bool,
    /// Outdoor temperature below which the boiler is locked out.
    /// Carried for operators; the control loop does not act on it.
    pub boiler_lockout_temp: f64,
    pub system_mode: SystemMode,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            emergency_stop: false,
            boiler_lockout_temp: 35.0,
            system_mode: SystemMode::Live,
        }
    }
}

/// Partial update of [`GlobalSettings`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_stop: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boiler_lockout_temp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_mode: Option<SystemMode>,
}

impl SettingsPatch {
    pub fn emergency_stop(value: bool) -> Self {
        Self {
            emergency_stop: Some(value),
            ..Default::default()
        }
    }

    /// Merge into `settings`, last writer wins per field
    pub fn apply_to(&self, settings: &mut GlobalSettings) {
        if let Some(stop) = self.emergency_stop {
            settings.emergency_stop = stop;
        }
        if let Some(temp) = self.boiler_lockout_temp {
            settings.boiler_lockout_temp = temp;
        }
        if let Some(mode) = self.system_mode {
            settings.system_mode = mode;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_only_touches_present_fields() {
        let mut settings = GlobalSettings::default();
        let patch: SettingsPatch =
            serde_json::from_str(r#"{"system_mode": "DEMO"}"#).unwrap();

        patch.apply_to(&mut settings);

        assert_eq!(settings.system_mode, SystemMode::Demo);
        assert!(!settings.emergency_stop);
        assert_eq!(settings.boiler_lockout_temp, 35.0);
    }
}
