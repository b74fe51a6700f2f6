//! CLI entry point for inverter calibration.
//!
//! Subcommands:
//! - `run`: execute the configured sweep and export the calibration tables
//! - `probe`: connectivity check (supply identity, sensor channel count)
//!
//! `--mock` swaps both endpoints for simulated hardware so the full loop
//! can be exercised without a bench.

use anyhow::Result;
use clap::{Parser, Subcommand};
use inverter_cal::config::Settings;
use inverter_cal::data::CsvExporter;
use inverter_cal::error::CalError;
use inverter_cal::hardware::capabilities::{InverterSensor, PowerSupply};
use inverter_cal::hardware::keysight::{KeysightSupply, SupplyProfile};
use inverter_cal::hardware::mock::{MockSensor, MockSupply};
use inverter_cal::hardware::particle::ParticleSensor;
use inverter_cal::sweep::{AbortReason, SweepController, SweepState};
use inverter_cal::tracing_setup;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "inverter-cal")]
#[command(about = "Power-inverter calibration sweeps", long_about = None)]
struct Cli {
    /// Config name under config/ (default: "default")
    #[arg(long, global = true)]
    config: Option<String>,

    /// Use simulated endpoints instead of bench hardware
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured sweep and export the calibration tables
    Run,
    /// Check connectivity: supply identity and sensor channel count
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::new(cli.config.as_deref())?;
    tracing_setup::init_from_settings(&settings).map_err(anyhow::Error::msg)?;

    let (supply, sensor) = build_endpoints(&settings, cli.mock)?;

    match cli.command {
        Commands::Run => run_sweep(&settings, supply, sensor).await,
        Commands::Probe => probe(supply, sensor).await,
    }
}

/// Construct the two endpoints, real or simulated.
fn build_endpoints(
    settings: &Settings,
    mock: bool,
) -> Result<(Arc<dyn PowerSupply>, Arc<dyn InverterSensor>)> {
    if mock {
        info!("using simulated endpoints");
        let supply: Arc<dyn PowerSupply> = Arc::new(MockSupply::new());
        let sensor: Arc<dyn InverterSensor> = Arc::new(MockSensor::new(3));
        return Ok((supply, sensor));
    }

    let profile = SupplyProfile::for_model(settings.supply.profile);
    let supply: Arc<dyn PowerSupply> = Arc::new(KeysightSupply::new(
        &settings.supply.host,
        settings.supply.port,
        profile,
        settings.supply.query_timeout,
    ));
    let sensor: Arc<dyn InverterSensor> = Arc::new(ParticleSensor::new(&settings.sensor)?);
    Ok((supply, sensor))
}

async fn run_sweep(
    settings: &Settings,
    supply: Arc<dyn PowerSupply>,
    sensor: Arc<dyn InverterSensor>,
) -> Result<()> {
    // Preflight: no point driving the supply if nothing is reporting.
    let channels = sensor.inverter_count().await?;
    if channels == 0 {
        anyhow::bail!("no inverter boards reporting; nothing to calibrate");
    }
    info!(channels, "inverter boards reporting");

    let (mut controller, handle) =
        SweepController::new(Arc::clone(&supply), sensor, settings.sweep.clone());

    // Ctrl-C requests cooperative cancellation; the controller still runs
    // its shutdown sequence before reporting.
    let cancel_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received; cancelling sweep");
            cancel_handle.cancel();
        }
    });

    println!("🚀 Starting calibration sweep ({channels} channels)...");
    let report = controller.run().await?;

    let exporter = CsvExporter::new(&settings.storage.output_dir);
    let (voltages_path, currents_path) = exporter.export(controller.samples(), channels)?;
    println!(
        "💾 Tables written: {} / {}",
        voltages_path.display(),
        currents_path.display()
    );

    match report.state {
        SweepState::Complete => {
            println!("✅ Sweep complete: {} steps recorded", report.steps_completed);
            Ok(())
        }
        _ => {
            eprintln!(
                "❌ Sweep aborted after {} recorded steps",
                report.steps_completed
            );
            match report.abort_reason {
                Some(AbortReason::RetriesExhausted {
                    operation,
                    attempts,
                    last_error,
                }) => Err(CalError::RetryExhausted {
                    operation,
                    attempts,
                    last_error,
                }
                .into()),
                Some(AbortReason::Cancelled) => anyhow::bail!("sweep cancelled by operator"),
                None => anyhow::bail!("sweep aborted"),
            }
        }
    }
}

async fn probe(supply: Arc<dyn PowerSupply>, sensor: Arc<dyn InverterSensor>) -> Result<()> {
    println!("🔌 Probing calibration endpoints...");

    supply.open().await?;
    let identity = supply.identify().await;
    if let Err(e) = supply.close().await {
        warn!("probe: closing supply link failed: {}", e);
    }
    println!("   Supply: {}", identity?);

    let channels = sensor.inverter_count().await?;
    println!("   Inverter channels: {channels}");

    println!("✅ Both endpoints reachable");
    Ok(())
}
