//! Cell assembly
//!
//! Builds every machine driver from the configuration and the factory file,
//! registers them for job dispatch and wires gantry state changes back into
//! the factory file.

use anyhow::Context;
use cellkit_communication::{ArmClient, GantryController, GripperClient};
use cellkit_jobs::{JobsManager, Machine, MachineRegistry};
use cellkit_settings::{Config, FactoryStore};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Registry name of the gantry
pub const GANTRY: &str = "gantry";
/// Registry name of the arm
pub const ARM: &str = "cobot280";
/// Registry name of the gripper
pub const GRIPPER: &str = "gripper";

/// Every machine of the cell plus its persisted state and jobs
#[derive(Debug)]
pub struct Cell {
    pub config: Config,
    pub factory: Arc<FactoryStore>,
    pub gantry: Arc<GantryController>,
    pub arm: Arc<ArmClient>,
    pub gripper: Arc<GripperClient>,
    pub registry: Arc<MachineRegistry>,
    pub jobs: Arc<JobsManager>,
}

impl Cell {
    /// Assemble the cell; relative data paths resolve against `config_path`
    pub fn build(config: Config, config_path: &Path) -> anyhow::Result<Self> {
        let factory_path = config.resolve(config_path, &config.factory_file);
        let factory = Arc::new(
            FactoryStore::open(&factory_path)
                .with_context(|| format!("opening factory file {}", factory_path.display()))?,
        );
        let snapshot = factory.snapshot();

        let jobs_path = match &snapshot.jobs_file {
            Some(file) => config.resolve(config_path, Path::new(file)),
            None => config.resolve(config_path, &config.jobs_file),
        };
        let jobs = Arc::new(JobsManager::load(jobs_path));

        let gantry = Arc::new(
            GantryController::new(GANTRY, config.gantry.clone())
                .with_state(snapshot.machines.gantry.clone()),
        );
        gantry.subscribe("factory", factory.gantry_listener());

        let arm = Arc::new(ArmClient::new(ARM, config.arm.clone()));
        let gripper = Arc::new(
            GripperClient::new(GRIPPER, config.gripper.clone())
                .context("building gripper HTTP client")?,
        );

        let registry = Arc::new(MachineRegistry::new(snapshot.planner(config.planner)));
        registry.register(GANTRY, Machine::Gantry(gantry.clone()));
        registry.register(ARM, Machine::Arm(arm.clone()));
        registry.register(GRIPPER, Machine::Gripper(gripper.clone()));

        Ok(Self {
            config,
            factory,
            gantry,
            arm,
            gripper,
            registry,
            jobs,
        })
    }

    /// Connect every machine; failures are logged and leave that machine down
    pub async fn connect_all(&self) -> BTreeMap<String, bool> {
        if let Err(e) = self.gantry.connect(&self.config.gantry_connection).await {
            tracing::error!("{}: {}", GANTRY, e);
        }
        if let Err(e) = self.arm.connect().await {
            tracing::error!("{}: {}", ARM, e);
        }
        if let Err(e) = self.gripper.connect().await {
            tracing::error!("{}: {}", GRIPPER, e);
        }

        let health = self.registry.health();
        for (name, up) in &health {
            tracing::info!("{}: {}", name, if *up { "connected" } else { "offline" });
        }
        health
    }

    /// Close the gantry transport and write the final gantry state
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        if self.gantry.is_connected() {
            self.gantry.disconnect().await?;
        }
        let state = self.gantry.snapshot();
        self.factory.update(|file| file.update_gantry(&state))?;
        Ok(())
    }
}
