use anyhow::{bail, Context};
use cellkit::{init_logging, Cell, Config, ConnectionParams, BUILD_DATE, VERSION};
use std::path::PathBuf;

const USAGE: &str = "\
usage: cellkit [--config PATH] [--simulate] [--list] [--ports] [JOB_ID...]

  --config PATH   configuration file (.toml or .json)
  --simulate      drive a simulated gantry instead of the configured port
  --list          print the job table and exit
  --ports         print candidate serial ports and exit
  JOB_ID...       run these jobs in order, stopping at the first failure";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    simulate: bool,
    list: bool,
    ports: bool,
    jobs: Vec<u64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                args.config = Some(it.next().context("--config needs a path")?.into());
            }
            "--simulate" => args.simulate = true,
            "--list" => args.list = true,
            "--ports" => args.ports = true,
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => match other.parse::<u64>() {
                Ok(id) => args.jobs.push(id),
                Err(_) => bail!("unexpected argument '{}'\n\n{}", other, USAGE),
            },
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let args = parse_args()?;
    tracing::info!("cellkit {} (built {})", VERSION, BUILD_DATE);

    if args.ports {
        for port in cellkit::list_ports()? {
            println!("{}  {}", port.port_name, port.description);
        }
        return Ok(());
    }

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if args.simulate {
        config.gantry_connection = ConnectionParams::simulated();
    }

    let cell = Cell::build(config, &config_path)?;

    if args.list {
        for (id, job) in cell.jobs.get_jobs() {
            println!(
                "{:>4}  {:<8} {:<10} {:<12} {}",
                id, job.status, job.machine, job.action, job.description
            );
        }
        return Ok(());
    }

    cell.connect_all().await;

    if !args.jobs.is_empty() {
        let handle = cell.jobs.run_jobs(args.jobs, cell.registry.clone());
        match handle.await? {
            Ok(results) => tracing::info!("{} job(s) completed", results.len()),
            Err(e) => tracing::error!("Job run stopped: {}", e),
        }
    }

    cell.shutdown().await
}
