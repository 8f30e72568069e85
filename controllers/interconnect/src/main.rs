//! Interconnect Controller
//!
//! Derives the interconnect topology from application deployments and keeps
//! the VAN data plane of every member cluster in line with it.

use clap::Parser;
use interconnect_controller::config::{Args, LogFormat};
use interconnect_controller::controller::Controller;
use interconnect_controller::error::ControllerError;
use interconnect_controller::health::{self, Readiness};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Plain => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let args = Args::parse();
    init_tracing(args.log_format);

    // Both kube and reqwest build rustls clients
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        return Err(ControllerError::InvalidConfig(
            "a rustls crypto provider is already installed".to_string(),
        ));
    }

    info!("Starting Interconnect Controller");
    info!("Configuration:");
    info!("  Mode: {:?}", args.mode);
    info!("  Probe address: {}", args.probe_addr);
    info!("  Concurrency: {}", args.concurrency);

    let readiness = Readiness::new();
    let probe_addr = args.probe_addr;
    let probes = readiness.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve(probe_addr, probes).await {
            error!("Health probes stopped: {}", e);
        }
    });

    let controller = Controller::new(&args, readiness).await?;
    controller.run().await?;

    Ok(())
}
