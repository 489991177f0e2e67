// OrbitSim - headless runner
// Loads a scenario, runs the producer thread and consumes snapshots at frame rate

use anyhow::{bail, ensure, Context, Result};
use chrono::Local;
use clap::Parser;
use log::{error, info};
use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use orbitsim::{
    ControllerConfig, Scenario, SimEvent, SimulationController, SimulationState, Snapshot,
    TelemetryWriter,
};

#[derive(Parser, Debug)]
#[command(name = "orbitsim", about = "N-body orbital and spacecraft simulator")]
struct Args {
    /// Scenario JSON file (falls back to ORBITSIM_SCENARIO)
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Simulated seconds to run
    #[arg(short, long, default_value_t = 86_400.0)]
    duration: f64,

    /// Override the scenario time step (seconds)
    #[arg(short, long)]
    time_step: Option<f64>,

    /// Write binary telemetry every frame
    #[arg(long)]
    telemetry: bool,

    /// Directory for telemetry files
    #[arg(long, default_value = ".")]
    telemetry_dir: PathBuf,

    /// Minimum wall time per tick in milliseconds (0 = as fast as possible)
    #[arg(long, default_value_t = 0)]
    tick_interval_ms: u64,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    ensure!(args.duration > 0.0, "duration must be positive");

    let scenario_path = args
        .scenario
        .clone()
        .or_else(|| env::var_os("ORBITSIM_SCENARIO").map(PathBuf::from))
        .context("no scenario given (use --scenario or ORBITSIM_SCENARIO)")?;

    let scenario = Scenario::from_path(&scenario_path)
        .with_context(|| format!("failed to read {}", scenario_path.display()))?;

    let mut state = SimulationState::default();
    scenario.load_into(&mut state)?;
    if let Some(dt) = args.time_step {
        ensure!(dt.is_finite() && dt > 0.0, "time step must be positive");
        state.time_step = dt;
    }
    state.refresh_energy();
    state.running = true;

    let config = ControllerConfig {
        tick_interval: Duration::from_millis(args.tick_interval_ms),
        ..Default::default()
    };
    let mut controller = SimulationController::new(state, config);

    let mut telemetry = if args.telemetry {
        let name = format!("telemetry_{}.bin", Local::now().format("%Y%m%d_%H%M%S"));
        let path = args.telemetry_dir.join(name);
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        info!("writing telemetry to {}", path.display());
        Some(TelemetryWriter::new(BufWriter::new(file)))
    } else {
        None
    };

    controller.start()?;
    let frame_time = controller.config().frame_time;
    let mut last_report = Instant::now();
    let mut halted = None;

    loop {
        let frame_start = Instant::now();

        while let Some(event) = controller.try_next_event() {
            match event {
                SimEvent::Collision(collision) => {
                    error!("{}", collision);
                    halted = Some(collision);
                }
                SimEvent::Reset => info!("simulation reset"),
            }
        }
        if halted.is_some() {
            break;
        }

        // Render side: copy out a snapshot, then work without the lock
        let snapshot = controller.snapshot();
        if let Some(writer) = telemetry.as_mut() {
            writer.write_snapshot(&snapshot)?;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            report(&snapshot);
            last_report = Instant::now();
        }

        if snapshot.sim_time >= args.duration || !snapshot.running {
            report(&snapshot);
            break;
        }

        let elapsed = frame_start.elapsed();
        if elapsed < frame_time {
            thread::sleep(frame_time - elapsed);
        }
    }

    controller.shutdown();

    if let Some(mut writer) = telemetry {
        writer.flush()?;
        info!("wrote {} telemetry records", writer.records_written());
    }

    if let Some(collision) = halted {
        bail!("simulation halted: {}", collision);
    }
    Ok(())
}

fn report(snapshot: &Snapshot) {
    info!(
        "t = {:.0} s | dt = {:.3} s | {} ticks | energy drift {:.6}%",
        snapshot.sim_time, snapshot.time_step, snapshot.tick_count, snapshot.energy_drift
    );
    for craft in &snapshot.spacecraft {
        info!(
            "  {}: {:.1} m/s, fuel {:.1} kg, engine {}",
            craft.name,
            craft.speed,
            craft.fuel_mass,
            if craft.engine_on { "on" } else { "off" }
        );
    }
}
