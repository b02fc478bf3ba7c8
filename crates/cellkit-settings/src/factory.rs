//! Persisted factory file
//!
//! The factory file records the physical state of the cell between runs:
//! the gantry's tool end, holders and named locations, the arm's mounting
//! pose, the tool catalogue and the obstacle boxes used for planning. It is
//! JSON and is rewritten wholesale on every change.

use crate::error::SettingsResult;
use cellkit_communication::{GantryState, StateListener};
use cellkit_core::Pose;
use cellkit_planner::{Aabb, PathPlanner, PlannerConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arm section of the factory file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmState {
    #[serde(default)]
    pub pose: Pose,
}

/// Per-machine sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineSections {
    #[serde(default)]
    pub gantry: GantryState,
    #[serde(default)]
    pub cobot280: ArmState,
    /// Opaque; the gripper keeps no state worth restoring
    #[serde(default)]
    pub gripper: Map<String, Value>,
    /// Opaque; the tool-changer board is configured by its firmware
    #[serde(default)]
    pub arduino: Map<String, Value>,
}

/// Whole factory file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactoryFile {
    #[serde(default)]
    pub machines: MachineSections,
    #[serde(default)]
    pub tools: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs_file: Option<String>,
    #[serde(default)]
    pub obstacles: Vec<Aabb>,
}

impl FactoryFile {
    pub fn load(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&content)?;
        tracing::info!(
            "Loaded factory from {} ({} holders, {} locations, {} obstacles)",
            path.display(),
            file.machines.gantry.holders.len(),
            file.machines.gantry.locations.len(),
            file.obstacles.len()
        );
        Ok(file)
    }

    /// Load the factory, starting empty when the file does not exist yet
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!("Factory file {} not found, starting empty", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> SettingsResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved factory to {}", path.display());
        Ok(())
    }

    pub fn gantry(&self) -> &GantryState {
        &self.machines.gantry
    }

    pub fn arm_pose(&self) -> Pose {
        self.machines.cobot280.pose
    }

    /// Replace the gantry section with a fresh snapshot
    pub fn update_gantry(&mut self, state: &GantryState) {
        self.machines.gantry = state.clone();
    }

    /// Planner over this factory's obstacle set
    pub fn planner(&self, config: PlannerConfig) -> PathPlanner {
        PathPlanner::new(config).with_obstacles(self.obstacles.iter().copied())
    }
}

/// Factory file bound to its path, shared by the running machines
#[derive(Debug)]
pub struct FactoryStore {
    path: PathBuf,
    file: Mutex<FactoryFile>,
}

impl FactoryStore {
    pub fn open(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let file = FactoryFile::load_or_default(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> FactoryFile {
        self.file.lock().clone()
    }

    /// Apply a change and write the file
    pub fn update<F>(&self, change: F) -> SettingsResult<()>
    where
        F: FnOnce(&mut FactoryFile),
    {
        let mut file = self.file.lock();
        change(&mut file);
        file.save(&self.path)
    }

    /// Listener that persists every gantry state change
    pub fn gantry_listener(self: &Arc<Self>) -> StateListener {
        let store = Arc::clone(self);
        Arc::new(move |state: &GantryState| {
            if let Err(e) = store.update(|file| file.update_gantry(state)) {
                tracing::error!("Failed to persist gantry state: {}", e);
            }
        })
    }
}
