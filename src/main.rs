use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use localnet::config::ConfigRoot;
use localnet::errors::LocalnetError;
use localnet::keys::KeyMaterial;
use localnet::materialize::{configure_network, refresh_genesis_time};
use localnet::orchestrator::{Orchestrator, ProcessExit, StartupPolicy};
use localnet::software::{build_binaries, SoftwareResolver};
use localnet::status::network_status;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Create and run a local multi-shard test network",
    long_about = None
)]
struct Cli {
    /// Network configuration file
    #[arg(long, global = true, default_value = "localnet.toml")]
    configfile: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a configuration file with default values
    New,
    /// Generate the folder tree of every node of the network
    Configure,
    /// Download and build the node, seednode and proxy executables
    Prerequisites,
    /// Run the configured network
    Start {
        /// Stop the whole network after this many seconds
        #[arg(long)]
        stop_after: Option<u64>,
    },
    /// Remove the generated folder tree
    Clean,
    /// Print the current block nonce of every node
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::New => new(&cli.configfile),
        Command::Configure => configure(&cli.configfile),
        Command::Prerequisites => prerequisites(&cli.configfile).await,
        Command::Start { stop_after } => start(&cli.configfile, stop_after).await,
        Command::Clean => clean(&cli.configfile),
        Command::Status => status(&cli.configfile).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_config(path: &Path) -> Result<ConfigRoot> {
    let config = ConfigRoot::from_file(path)
        .with_context(|| format!("failed to load configuration {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    Ok(config)
}

fn new(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(LocalnetError::AlreadyExists(path.to_path_buf()).into());
    }
    ConfigRoot::default()
        .save(path)
        .with_context(|| format!("failed to write configuration {}", path.display()))?;
    info!(target = "localnet", path = %path.display(), "configuration written");
    Ok(())
}

fn configure(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let parents = SoftwareResolver::from_config(&config)
        .resolve()
        .context("unable to locate node software; run `prerequisites` first")?;
    let keys = KeyMaterial::from_config(&config);
    let summary =
        configure_network(&config, &parents, &keys).context("failed to configure network")?;

    info!(
        target = "localnet",
        root = %summary.root.display(),
        validators = summary.validators,
        observers = summary.observers,
        "network ready"
    );
    println!("genesis contracts owner: {}", summary.genesis_owner);
    println!(
        "delegation manager: {} ({})",
        summary.delegation_manager,
        summary.delegation_manager.to_hex()
    );
    Ok(())
}

async fn prerequisites(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let resolver = SoftwareResolver::from_config(&config);
    resolver
        .download()
        .await
        .context("failed to download node software")?;
    build_binaries(&resolver)
        .await
        .context("failed to build node software")?;
    let parents = resolver.resolve().context("node software is incomplete")?;
    info!(
        target = "localnet",
        node = %parents.node_binary().display(),
        seednode = %parents.seednode_binary().display(),
        proxy = %parents.proxy_binary().display(),
        "prerequisites ready"
    );
    Ok(())
}

async fn start(path: &Path, stop_after: Option<u64>) -> Result<()> {
    let config = load_config(path)?;
    let root = config.root_folder();
    if !root.is_dir() {
        bail!(
            "network folder {} does not exist; run `configure` first",
            root.display()
        );
    }

    let start_time = refresh_genesis_time(&config).context("failed to refresh genesis time")?;
    info!(target = "localnet", start_time, "genesis time set");

    let orchestrator = Orchestrator::from_config(&config, StartupPolicy::default())
        .context("network cannot be started")?;
    let report = orchestrator.run(stop_after.map(Duration::from_secs)).await;

    for process in &report.processes {
        match &process.exit {
            ProcessExit::Failed(message) => warn!(
                target = "localnet",
                label = %process.label,
                pid = ?process.pid,
                "process failed: {message}"
            ),
            exit => info!(
                target = "localnet",
                label = %process.label,
                pid = ?process.pid,
                exit = ?exit,
                "process finished"
            ),
        }
    }
    Ok(())
}

fn clean(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let root = config.root_folder();
    if root.exists() {
        std::fs::remove_dir_all(&root)
            .with_context(|| format!("failed to remove {}", root.display()))?;
        info!(target = "localnet", root = %root.display(), "network folder removed");
    }
    Ok(())
}

async fn status(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    for (label, status) in network_status(&config).await {
        match status {
            Ok(status) => println!("{label}: nonce {}", status.nonce),
            Err(err) => println!("{label}: unavailable ({err})"),
        }
    }
    Ok(())
}
