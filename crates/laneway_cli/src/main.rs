//! laneway CLI
//!
//! Drive the invocation engine against a simulated cluster, validate
//! governance configuration and print application labels.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use indexmap::IndexMap;
use laneway_cluster::{GovernanceContext, InvocationEngine};
use laneway_core::{AppState, Application, SystemClock};
use laneway_policy::{GovernanceConfig, PolicySnapshot, PolicyStore};
use laneway_sim::{EndpointBehavior, SimCluster, SimConfig, SimHarness, SimSeed};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "laneway")]
#[command(about = "laneway - cluster invocation engine for runtime traffic governance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run governed calls against a simulated cluster and print a JSON summary
    Simulate {
        /// Policy snapshot: {"version": n, "services": [...]}, version >= 1
        #[arg(short, long)]
        policy: PathBuf,
        /// Governance config; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Simulated service
        #[arg(long, default_value = "order")]
        service: String,
        /// Number of calls
        #[arg(long, default_value_t = 100)]
        calls: u64,
        /// Number of endpoints
        #[arg(long, default_value_t = 3)]
        endpoints: u16,
        /// Probability that a dispatch fails
        #[arg(long, default_value_t = 0.1)]
        fail_rate: f64,
        /// Simulated dispatch latency in milliseconds
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
        /// Seed for the simulated endpoints
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Calls in flight at once
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },
    /// Validate a governance config file
    CheckConfig {
        /// Config file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Print the labels of an application
    Labels {
        /// Application file
        #[arg(short, long)]
        file: PathBuf,
        /// Print the policy synchronization labels instead of registry labels
        #[arg(long)]
        sync: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("laneway=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            policy,
            config,
            service,
            calls,
            endpoints,
            fail_rate,
            latency_ms,
            seed,
            concurrency,
        } => {
            let config = match config {
                Some(path) => GovernanceConfig::from_path(&path)
                    .wrap_err_with(|| format!("loading config {}", path.display()))?,
                None => GovernanceConfig::default(),
            };
            let store = Arc::new(PolicyStore::new());
            store.publish(load_policies(&policy)?)?;

            let app = Arc::new(AppState::dynamic());
            app.on_policy_ready();
            let context = Arc::new(GovernanceContext::new(app, &config, Arc::new(SystemClock))?);
            let sweepers = context.spawn_sweepers();
            let engine = InvocationEngine::with_context(&config, store, context)?;

            let behavior = EndpointBehavior::failing(fail_rate).with_latency(latency_ms);
            let cluster =
                SimCluster::uniform(&service, endpoints, &behavior, SimSeed::from_literal(seed))?
                    .without_events();
            let summary = SimHarness::new(SimConfig::new(calls).with_concurrency(concurrency))
                .run(&engine, &cluster)
                .await;
            for sweeper in sweepers {
                sweeper.abort();
            }
            println!("{}", summary.to_json()?);
            Ok(())
        }
        Commands::CheckConfig { file } => {
            let config = GovernanceConfig::from_path(&file)
                .wrap_err_with(|| format!("checking {}", file.display()))?;
            println!("{} is valid", file.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Labels { file, sync } => {
            let json = std::fs::read_to_string(&file)
                .wrap_err_with(|| format!("reading {}", file.display()))?;
            let application: Application = serde_json::from_str(&json)?;
            let labels = collect_labels(&application, sync);
            println!("{}", serde_json::to_string_pretty(&labels)?);
            Ok(())
        }
    }
}

fn load_policies(path: &Path) -> Result<PolicySnapshot> {
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading policies {}", path.display()))?;
    let snapshot = PolicySnapshot::from_json_str(&json)
        .wrap_err_with(|| format!("parsing policies {}", path.display()))?;
    tracing::info!(
        version = snapshot.version,
        services = snapshot.len(),
        "loaded policies"
    );
    Ok(snapshot)
}

/// Labels in emission order
fn collect_labels(application: &Application, sync: bool) -> IndexMap<String, String> {
    let mut labels = IndexMap::new();
    let mut consumer = |key: &str, value: &str| {
        labels.insert(key.to_string(), value.to_string());
    };
    if sync {
        application.label_sync(&mut consumer);
    } else {
        application.label_registry(&mut consumer);
    }
    labels
}
