use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};
use std::path::PathBuf;

use netfence::config::Config;
use netfence::config_loader;
use netfence::fence::{ContainerInfo, Fence};
use netfence::state::StateDir;

/// Container network allocation for a single host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the network configuration YAML file (built-in defaults if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding one allocation record per container
    #[arg(short, long, default_value = "/var/lib/netfence")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate a network for a container and print its process environment
    Build {
        /// Container id the allocation is recorded under
        #[arg(long)]
        id: String,

        /// Network spec: empty, an address, or a CIDR (e.g. 10.254.0.8/30)
        #[arg(default_value = "")]
        spec: String,
    },
    /// Release a container's network and delete its record
    Release {
        /// Container id to release
        id: String,
    },
    /// Show every recorded allocation
    List,
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config_loader::load_config(path)?,
        None => Config::default(),
    };
    init_logging(&config);

    let fence = Fence::from_config(&config.network)?;
    let state = StateDir::open(&args.state_dir)?;

    // Every run starts by restoring what previous runs handed out
    let report = fence.recover_all(state.records()?);
    for (id, error) in &report.failed {
        warn!("Container {} has an unrecoverable network record: {}", id, error);
    }

    match args.command {
        Command::Build { id, spec } => {
            if state.contains(&id) {
                bail!("Container {} already has a network allocation", id);
            }

            let allocation = fence
                .build(&spec)
                .wrap_err_with(|| format!("Failed to allocate network for container {}", id))?;
            let path = state.save(&id, &allocation)?;
            info!("Allocated {} for {} ({})", allocation, id, path.display());

            for var in allocation.process_environment() {
                println!("{}", var);
            }
        }
        Command::Release { id } => {
            let allocation = report
                .recovered
                .into_iter()
                .find_map(|(key, allocation)| (key == id).then_some(allocation))
                .ok_or_else(|| eyre!("No recovered network allocation for container {}", id))?;

            let description = allocation.describe();
            allocation.dismantle()?;
            state.remove(&id)?;
            info!("Released {} for {}", description, id);
        }
        Command::List => {
            for (id, allocation) in &report.recovered {
                let mut info = ContainerInfo::default();
                allocation.info(&mut info);
                println!(
                    "{}\tsubnet={}\thost_ip={}\tcontainer_ip={}",
                    id,
                    allocation.subnet(),
                    info.host_ip,
                    info.container_ip
                );
            }
            println!(
                "{} of {} subnets in use",
                fence.pool().allocated_subnets().len(),
                fence.capacity()
            );
        }
    }

    Ok(())
}

fn init_logging(config: &Config) {
    // Initialize logging with default filter level of "info"
    let level = config.general.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}
