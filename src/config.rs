//! TOML configuration for the whole control core.
//!
//! Every field has a default, so a partial file (or none at all) is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bus::BusConfig;
use crate::drives::DriveConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::heartbeat::HeartbeatConfig;
use crate::plan::PlanConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomicConfig {
    pub heartbeat: HeartbeatConfig,
    pub drives: DriveConfig,
    pub plan: PlanConfig,
    pub bus: BusConfig,
}

impl AutonomicConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Load from a TOML file, or use defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config: no file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    fn parse(content: &str, path: &Path) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AutonomicConfig::default();
        assert_eq!(config.heartbeat.interval_secs, 30.0);
        assert_eq!(config.heartbeat.max_actions_per_tick, 3);
        assert_eq!(config.plan.retry_ceiling, 3);
        assert_eq!(config.plan.loops.dominance_window, 7);
        assert_eq!(config.plan.loops.dominance_threshold, 5);
        assert_eq!(config.plan.loops.observe_streak_limit, 2);
        assert_eq!(config.bus.history_capacity, 1000);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[heartbeat]\ninterval_secs = 5.0\nrng_seed = 42\n\n[plan]\nretry_ceiling = 5\n\n[plan.loops]\ndominance_threshold = 4\n",
        )
        .unwrap();

        let config = AutonomicConfig::load(&path).unwrap();
        assert_eq!(config.heartbeat.interval_secs, 5.0);
        assert_eq!(config.heartbeat.rng_seed, Some(42));
        assert_eq!(config.heartbeat.max_actions_per_tick, 3);
        assert_eq!(config.plan.retry_ceiling, 5);
        assert_eq!(config.plan.loops.dominance_threshold, 4);
        assert_eq!(config.plan.loops.dominance_window, 7);
        assert_eq!(config.drives.boredom_threshold, 0.4);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AutonomicConfig::default();
        config.drives.energy_floor = 0.25;
        config.plan.loops.observe_tools.push("screenshot".into());
        config.save(&path).unwrap();

        let loaded = AutonomicConfig::load(&path).unwrap();
        assert_eq!(loaded.drives.energy_floor, 0.25);
        assert_eq!(loaded.plan.loops.observe_tools, vec!["see_screen", "screenshot"]);
    }

    #[test]
    fn missing_file_is_default_but_garbage_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(AutonomicConfig::load_or_default(&missing).is_ok());
        assert!(matches!(
            AutonomicConfig::load(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[heartbeat\ninterval_secs = ").unwrap();
        assert!(matches!(
            AutonomicConfig::load_or_default(&bad),
            Err(ConfigError::Parse { .. })
        ));
    }
}
