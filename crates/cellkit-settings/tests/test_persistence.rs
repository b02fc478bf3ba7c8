use cellkit_communication::{
    Communicator, ConnectionParams, DeviceChannel, GantryConfig, GantryController, GantryState,
    SimulatedTinyG, ToolChangeConfig,
};
use cellkit_core::{Holder, Location, Position};
use cellkit_settings::{Config, FactoryFile, FactoryStore, SettingsError};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_config_roundtrip_toml_and_json() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.gantry_connection = ConnectionParams::serial("/dev/ttyACM1", 230400);
    config.planner.safe_z = 80.0;
    config.gripper.servo_id = 3;

    for name in ["config.toml", "config.json"] {
        let path = dir.path().join(name);
        config.save_to_file(&path).unwrap();
        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config, "{} did not roundtrip", name);
    }
}

#[test]
fn test_partial_toml_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "factory_file = \"cell.json\"\n\n[gantry_connection]\nport = \"/dev/ttyUSB3\"\n\n[gantry.tool_change]\napproach_dwell_s = 4.0\n",
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.factory_file.to_str(), Some("cell.json"));
    assert_eq!(config.gantry_connection.port, "/dev/ttyUSB3");
    assert_eq!(config.gantry_connection.baud_rate, 115200);
    assert_eq!(config.gantry.tool_change.approach_dwell_s, 4.0);
    assert_eq!(config.gantry.tool_change.seat_dwell_s, 3.0);
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[planner]\nstep = -1.0\n").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::InvalidSetting { .. })
    ));

    std::fs::write(&path, "not = [valid").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::TomlError(_))
    ));
}

#[test]
fn test_missing_files_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, Config::default());

    let factory = FactoryFile::load_or_default(&dir.path().join("absent.json")).unwrap();
    assert_eq!(factory, FactoryFile::default());
}

#[test]
fn test_factory_store_update_writes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("factory.json");
    let store = FactoryStore::open(&path).unwrap();

    store
        .update(|file| file.jobs_file = Some("jobs.json".to_string()))
        .unwrap();

    let reloaded = FactoryFile::load(&path).unwrap();
    assert_eq!(reloaded.jobs_file.as_deref(), Some("jobs.json"));
    assert_eq!(store.snapshot(), reloaded);
}

#[tokio::test]
async fn test_gantry_changes_are_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("factory.json");
    let store = Arc::new(FactoryStore::open(&path).unwrap());

    let state = GantryState {
        holders: vec![Holder::new(
            "holder1",
            Position::new(100.0, 20.0, 10.0, 0.0),
            Position::new(100.0, 35.0, 10.0, 0.0),
        )
        .with_tool("gripper")],
        ..GantryState::default()
    };
    let channel = DeviceChannel::with_factory(
        "gantry",
        Arc::new(|_: &ConnectionParams| -> Box<dyn Communicator> {
            Box::new(SimulatedTinyG::new())
        }),
    );
    let config = GantryConfig {
        settle_ms: 0,
        reset_settle_ms: 0,
        tool_change: ToolChangeConfig::immediate(),
        ..GantryConfig::default()
    };
    let gantry = GantryController::with_channel("gantry", config, channel).with_state(state);
    gantry.subscribe("factory", store.gantry_listener());
    gantry.connect(&ConnectionParams::simulated()).await.unwrap();

    assert!(gantry.attach("holder1").await.unwrap());
    gantry.edit_locations(vec![Location::new(
        "feeder",
        Position::new(40.0, 60.0, 5.0, 0.0),
    )]);

    let saved = FactoryFile::load(&path).unwrap();
    assert_eq!(saved.gantry().toolend.tool.as_deref(), Some("gripper"));
    assert_eq!(saved.gantry().holder("holder1").and_then(|h| h.tool.clone()), None);
    assert_eq!(saved.gantry().locations.len(), 1);
}
