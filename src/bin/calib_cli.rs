use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multisensor_calibration::capture::{CaptureStatistics, SessionStore};
use multisensor_calibration::estimation::{CalibrationOutcome, ParameterEstimator, Scored};
use multisensor_calibration::telemetry;
use multisensor_calibration::{init_logging, AppConfig, QualityAssessor};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "calib-cli",
    about = "Offline quality checks and parameter estimation for calibration captures"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/calibration_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log to stderr
    #[arg(long, global = true)]
    verbose: bool,
    /// Dump recorded telemetry events to stderr on exit
    #[arg(long, global = true)]
    telemetry: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score an RGB/thermal pair; exits 2 when a retake is advised
    Assess {
        #[arg(long)]
        rgb: PathBuf,
        #[arg(long)]
        thermal: PathBuf,
    },
    /// Estimate camera intrinsics and distortion
    Camera {
        #[arg(long)]
        rgb: PathBuf,
        #[arg(long)]
        thermal: Option<PathBuf>,
        #[arg(long)]
        high_res: bool,
    },
    /// Estimate thermal range, noise and uniformity
    Thermal {
        #[arg(long)]
        image: PathBuf,
    },
    /// Simulated sensor baseline
    Baseline {
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List capture sessions, most recent first
    Sessions {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Session coverage counts
    Stats {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Delete both artifacts of a session
    Delete {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        id: String,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    if cli.verbose {
        init_logging();
    }
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    let code = dispatch(cli.command, config)?;
    if cli.telemetry {
        let snapshot = telemetry::hub().snapshot();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("serializing telemetry")?
        );
    }
    Ok(code)
}

fn dispatch(command: Commands, config: AppConfig) -> Result<ExitCode> {
    match command {
        Commands::Assess { rgb, thermal } => run_assess(config, rgb, thermal),
        Commands::Camera {
            rgb,
            thermal,
            high_res,
        } => {
            let estimator = ParameterEstimator::new(config.estimation, &config.quality);
            let outcome = estimator.estimate_camera_parameters(Some(rgb.as_path()), thermal.as_deref(), high_res);
            emit_outcome(&outcome)
        }
        Commands::Thermal { image } => {
            let estimator = ParameterEstimator::new(config.estimation, &config.quality);
            emit_outcome(&estimator.estimate_thermal_parameters(Some(image.as_path())))
        }
        Commands::Baseline { seed } => run_baseline(config, seed),
        Commands::Sessions { dir } => {
            let sessions = SessionStore::new(dir).list();
            emit_json(&sessions)?;
            Ok(ExitCode::from(0))
        }
        Commands::Stats { dir } => {
            let sessions = SessionStore::new(dir).list();
            let stats = CaptureStatistics::from_store(&sessions);
            emit_json(&stats)?;
            Ok(ExitCode::from(0))
        }
        Commands::Delete { dir, id } => {
            let deleted = SessionStore::new(dir).delete(&id);
            emit_json(&DeletePayload {
                session_id: &id,
                deleted,
            })?;
            Ok(ExitCode::from(if deleted { 0 } else { 2 }))
        }
    }
}

fn run_assess(config: AppConfig, rgb: PathBuf, thermal: PathBuf) -> Result<ExitCode> {
    let assessor = QualityAssessor::new(config.quality);
    let report = assessor.assess_files(&rgb, &thermal);
    emit_json(&report)?;

    if report.recommendation.is_acceptable() {
        Ok(ExitCode::from(0))
    } else {
        eprintln!("{}", report.details);
        Ok(ExitCode::from(2))
    }
}

fn run_baseline(mut config: AppConfig, seed: Option<u64>) -> Result<ExitCode> {
    if seed.is_some() {
        config.estimation.synthetic_seed = seed;
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let estimator = ParameterEstimator::new(config.estimation, &config.quality);
    let outcome = runtime.block_on(estimator.estimate_sensor_baseline(None));
    emit_outcome(&outcome)
}

/// Print the outcome; exit 2 unless it was accepted.
fn emit_outcome<T: Serialize + Scored>(outcome: &CalibrationOutcome<T>) -> Result<ExitCode> {
    emit_json(outcome)?;
    if let Some(message) = outcome.message() {
        eprintln!("{message}");
    }
    Ok(ExitCode::from(if outcome.is_success() { 0 } else { 2 }))
}

fn emit_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct DeletePayload<'a> {
    session_id: &'a str,
    deleted: bool,
}
