//! Application configuration
//!
//! One [`Config`] holds the transport and timing settings for every machine
//! in the cell plus the planner parameters. It loads from and saves to
//! `.toml` or `.json`, chosen by file extension.

use crate::error::{SettingsError, SettingsResult};
use cellkit_communication::{ArmConfig, ConnectionParams, GantryConfig, GripperConfig};
use cellkit_planner::PlannerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "cellkit";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persisted machine state (tool end, holders, locations, obstacles)
    pub factory_file: PathBuf,
    /// Persisted job table
    pub jobs_file: PathBuf,
    /// Gantry transport
    pub gantry_connection: ConnectionParams,
    /// Gantry driver timing
    pub gantry: GantryConfig,
    pub planner: PlannerConfig,
    pub arm: ArmConfig,
    pub gripper: GripperConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            factory_file: PathBuf::from("factory.json"),
            jobs_file: PathBuf::from("jobs.json"),
            gantry_connection: ConnectionParams::default(),
            gantry: GantryConfig::default(),
            planner: PlannerConfig::default(),
            arm: ArmConfig::default(),
            gripper: GripperConfig::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform config directory for the application
    pub fn config_dir() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no platform config directory".to_string())
            })
    }

    /// Default config file location, creating its directory if needed
    pub fn default_path() -> SettingsResult<PathBuf> {
        let dir = Self::config_dir()?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| SettingsError::ConfigDirectory(format!("{}: {}", dir.display(), e)))?;
        Ok(dir.join(CONFIG_FILE))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;
        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };
        config.validate()?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load config, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve a relative data-file path against the config file's directory
    pub fn resolve(&self, config_path: &Path, file: &Path) -> PathBuf {
        if file.is_absolute() {
            return file.to_path_buf();
        }
        config_path
            .parent()
            .map(|dir| dir.join(file))
            .unwrap_or_else(|| file.to_path_buf())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.gantry_connection.baud_rate == 0 {
            return Err(SettingsError::invalid(
                "gantry_connection.baud_rate",
                "must be > 0",
            ));
        }
        if self.gantry_connection.timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "gantry_connection.timeout_ms",
                "must be > 0",
            ));
        }
        if self.gantry.default_speed <= 0.0 || self.gantry.tool_change.speed <= 0.0 {
            return Err(SettingsError::invalid("gantry", "feed rates must be > 0"));
        }

        let tc = &self.gantry.tool_change;
        if [tc.approach_dwell_s, tc.seat_dwell_s, tc.unlock_s, tc.release_dwell_s]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(SettingsError::invalid(
                "gantry.tool_change",
                "dwell times must be >= 0",
            ));
        }

        self.planner
            .validate()
            .map_err(|e| SettingsError::invalid("planner", e.to_string()))?;

        if self.arm.timeout_ms == 0 {
            return Err(SettingsError::invalid("arm.timeout_ms", "must be > 0"));
        }
        if self.gripper.timeout_ms == 0 {
            return Err(SettingsError::invalid("gripper.timeout_ms", "must be > 0"));
        }
        if !self.gripper.base_url.starts_with("http") {
            return Err(SettingsError::invalid(
                "gripper.base_url",
                "must be an http(s) URL",
            ));
        }
        Ok(())
    }
}
