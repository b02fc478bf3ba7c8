use cellkit::{
    Cell, Config, ConnectionParams, FactoryFile, Holder, Job, JobStatus, Position, ToolChangeConfig,
    ARM, GANTRY, GRIPPER,
};
use serde_json::json;
use std::net::TcpListener;
use tempfile::TempDir;

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn cell_config(dir: &TempDir) -> (Config, std::path::PathBuf) {
    let mut config = Config::default();
    config.gantry_connection = ConnectionParams::simulated();
    config.gantry.settle_ms = 0;
    config.gantry.reset_settle_ms = 0;
    config.gantry.tool_change = ToolChangeConfig::immediate();
    config.arm.host = "127.0.0.1".to_string();
    config.arm.port = closed_port();
    config.arm.timeout_ms = 500;
    config.gripper.base_url = format!("http://127.0.0.1:{}", closed_port());
    config.gripper.timeout_ms = 500;

    let path = dir.path().join("config.toml");
    config.save_to_file(&path).unwrap();
    (config, path)
}

fn seed_factory(dir: &TempDir) {
    let mut factory = FactoryFile::default();
    factory.machines.gantry.holders = vec![Holder::new(
        "holder1",
        Position::new(100.0, 20.0, 10.0, 0.0),
        Position::new(100.0, 35.0, 10.0, 0.0),
    )
    .with_tool("gripper")];
    factory.save(&dir.path().join("factory.json")).unwrap();
}

#[tokio::test]
async fn test_cell_runs_jobs_and_persists_state() {
    let dir = TempDir::new().unwrap();
    let (config, path) = cell_config(&dir);
    seed_factory(&dir);

    let cell = Cell::build(config, &path).unwrap();
    let health = cell.connect_all().await;
    assert_eq!(health.get(GANTRY), Some(&true));
    assert_eq!(health.get(ARM), Some(&false));
    assert_eq!(health.get(GRIPPER), Some(&false));

    let attach = match json!({"holder": "holder1"}) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    cell.jobs
        .update_job(Job::new(0, GANTRY, "attach", attach))
        .unwrap();
    let step = cell.jobs.add_job().unwrap();

    let results = cell
        .jobs
        .run_jobs(vec![0, step], cell.registry.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(cell.jobs.get_job(step).unwrap().status, JobStatus::Done);

    cell.shutdown().await.unwrap();
    assert!(!cell.gantry.is_connected());

    let saved = FactoryFile::load(&dir.path().join("factory.json")).unwrap();
    assert_eq!(saved.gantry().toolend.tool.as_deref(), Some("gripper"));
    assert_eq!(saved.gantry().toolend.position.y, 25.0);

    let jobs = std::fs::read_to_string(dir.path().join("jobs.json")).unwrap();
    assert!(jobs.contains("\"attach\""));
}

#[tokio::test]
async fn test_offline_machine_job_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let (config, path) = cell_config(&dir);

    let cell = Cell::build(config, &path).unwrap();
    let job = Job::new(0, GRIPPER, "speedUp", Default::default());
    cell.jobs.update_job(job).unwrap();

    let outcome = cell
        .jobs
        .run_job(0, cell.registry.clone())
        .unwrap()
        .await
        .unwrap();
    assert!(outcome.unwrap_err().is_connection_error());
    assert_eq!(cell.jobs.get_job(0).unwrap().status, JobStatus::Error);
}
