//! Thin supervisor binary: loads configuration, brings the orchestrator
//! up against a simulated fieldbus, and runs until interrupted. Wiring a
//! native adapter in instead of [`SimulatedAdapter`] is the integrator's
//! job (spec.md §1 places the native adapter out of scope); this binary
//! exists so the orchestrator can be exercised manually without one.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use drive_adapter::SimulatedAdapter;
use drive_orchestrator::{Orchestrator, OrchestratorConfig};

#[derive(Parser, Debug)]
#[command(name = "drive_orchestrator")]
#[command(about = "Drive Orchestrator demo supervisor, run against a simulated fieldbus")]
struct Args {
    /// Interface name passed through to the adapter's `initialize`.
    #[arg(short, long, default_value = "sim0")]
    interface: String,

    /// Path to a TOML file with `OrchestratorConfig` fields; defaults used if absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of simulated slaves to expose.
    #[arg(short = 'n', long, default_value_t = 2)]
    slaves: u16,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(%err, "drive orchestrator exited with an error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            OrchestratorConfig::from_toml(&text)?
        }
        None => OrchestratorConfig::default(),
    };

    info!(
        slaves = args.slaves,
        interface = %args.interface,
        cycle_period_ms = config.cycle_period_ms,
        "starting drive orchestrator"
    );

    let adapter = Box::new(SimulatedAdapter::new(args.slaves));
    let orchestrator = Orchestrator::new(adapter, config);
    orchestrator.initialize(&args.interface).await?;

    let mut faulted = orchestrator.subscribe_faulted()?;
    tokio::spawn(async move {
        while let Ok(event) = faulted.recv().await {
            warn!(slave = event.slave, code = ?event.code, hint = event.message, "drive fault");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    orchestrator.shutdown().await?;
    Ok(())
}

fn setup_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
