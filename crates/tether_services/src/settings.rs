//! Settings management

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tether_script::RuntimeSettings;

/// Settings file layout: engine limits plus service toggles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub runtime: RuntimeSettings,
    pub services: ServiceSettings,
}

/// Which globals the event loop installs, and how many timer threads it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub timer_threads: usize,
    pub enable_timers: bool,
    pub enable_fetch: bool,
    pub enable_console: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            timer_threads: 1,
            enable_timers: true,
            enable_fetch: true,
            enable_console: true,
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, ServiceError> {
        serde_json::from_str(json).map_err(|err| ServiceError::Settings(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_everything() {
        let settings = Settings::default();
        assert_eq!(settings.services.timer_threads, 1);
        assert!(settings.services.enable_timers);
        assert!(settings.services.enable_fetch);
        assert_eq!(settings.runtime, RuntimeSettings::default());
    }

    #[test]
    fn test_nested_partial_file() {
        let settings = Settings::from_json_str(
            r#"{ "runtime": { "max_stack_bytes": 524288 }, "services": { "enable_fetch": false } }"#,
        )
        .unwrap();
        assert_eq!(settings.runtime.max_stack_bytes, Some(512 * 1024));
        assert!(!settings.services.enable_fetch);
        assert!(settings.services.enable_timers);
    }

    #[test]
    fn test_rejects_wrong_types() {
        let err = Settings::from_json_str(r#"{ "services": { "timer_threads": "two" } }"#).unwrap_err();
        assert!(matches!(err, ServiceError::Settings(_)));
    }
}
