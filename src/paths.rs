//! XDG-compliant path resolution for autonomic.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};

const APP_DIR: &str = "autonomic";

/// Where configuration and persisted state live.
#[derive(Debug, Clone)]
pub struct AutonomicPaths {
    /// `$XDG_CONFIG_HOME/autonomic/`
    pub config_dir: PathBuf,
    /// `$XDG_STATE_HOME/autonomic/`, or the `--data-dir` override.
    pub state_dir: PathBuf,
}

impl AutonomicPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> ConfigResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join(APP_DIR);

        let state_dir = std::env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/state"))
            .join(APP_DIR);

        Ok(Self {
            config_dir,
            state_dir,
        })
    }

    /// Keep everything, config included, under one directory.
    pub fn rooted_at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            config_dir: dir.clone(),
            state_dir: dir,
        }
    }

    /// Resolve normally, but put state under `data_dir` when given.
    pub fn with_overrides(data_dir: Option<&Path>) -> ConfigResult<Self> {
        match data_dir {
            Some(dir) => Ok(Self::rooted_at(dir)),
            None => Self::resolve(),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn drives_file(&self) -> PathBuf {
        self.state_dir.join("drives.json")
    }

    pub fn heartbeat_log_file(&self) -> PathBuf {
        self.state_dir.join("heartbeat_log.json")
    }

    pub fn plan_file(&self) -> PathBuf {
        self.state_dir.join("plan_tracker.json")
    }

    /// Create the config and state directories. Idempotent.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        for dir in [&self.config_dir, &self.state_dir] {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::Write {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }
}
