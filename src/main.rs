use std::path::PathBuf;
use std::time::Instant;
use anyhow::{Context, Result};
use clap::Parser;

use body_measure_lib::output::{write_model_file, write_report_csv, write_report_json, ModelHeader};
use body_measure_lib::pipeline::{extract, load_views, write_debug_images};
use body_measure_lib::{Config, MeasurementSchema, Session};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Body measurement extraction from calibrated silhouette photographs")]
struct Args {
    /// Path to the session file listing the subject's photographs
    #[clap(short, long, required_unless_present = "write_default_config")]
    session: Option<PathBuf>,

    /// Path to configuration file
    #[clap(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Path to output directory (overwrites config)
    #[clap(short, long)]
    output: Option<String>,

    /// Subject mass in kg (overwrites the session)
    #[clap(short, long)]
    mass: Option<f64>,

    /// Enable debug mode (verbose logging and overlay images)
    #[clap(short, long)]
    debug: bool,

    /// Process views one after another
    #[clap(long)]
    sequential: bool,

    /// Write the default configuration to this path and exit
    #[clap(long)]
    write_default_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if let Some(path) = &args.write_default_config {
        Config::default()
            .save_to_file(path)
            .with_context(|| format!("writing default config to {}", path.display()))?;
        log::info!("Default configuration written to {}", path.display());
        return Ok(());
    }

    // Load configuration, falling back to defaults when the file is absent
    let mut config = if args.config.is_file() {
        Config::from_file(&args.config)?
    } else {
        log::warn!("{} not found, using default configuration", args.config.display());
        Config::default()
    };

    if let Some(output) = args.output.clone() {
        config.output_base_dir = output;
    }
    if args.sequential {
        config.use_parallel = false;
    }
    if args.debug {
        config.debug_images = true;
    }

    config.validate()?;

    let session_path = args
        .session
        .as_ref()
        .context("a session file is required")?;
    let mut session = Session::from_file(session_path)
        .with_context(|| format!("loading session {}", session_path.display()))?;
    if let Some(mass) = args.mass {
        session.mass = Some(mass);
        session.validate()?;
    }

    let start_time = Instant::now();

    let schema = MeasurementSchema::yeadon()?;
    let photos = load_views(&session, &config)?;
    let result = extract(&photos, &schema, &config)?;

    let output_dir = config.prepare_output_dir()?;
    let header = ModelHeader {
        measurement_conversion_factor: config.measurement_conversion_factor,
        total_mass: session.mass,
    };
    let model_path = write_model_file(&result.measurements, &schema, &header, &output_dir, &session.subject)?;
    write_report_csv(&result.measurements, &output_dir, &session.subject)?;
    write_report_json(&result.measurements, &output_dir, &session.subject)?;

    if config.debug_images {
        write_debug_images(&photos, &result, &output_dir, &session.subject)?;
    }

    for (key, failure) in result.measurements.missing() {
        log::debug!("missing {}: {}", key, failure);
    }

    log::info!(
        "Wrote {} ({} of {} measurements in {}) in {:.2} seconds",
        model_path.display(),
        result.measurements.present().count(),
        result.measurements.len(),
        config.length_unit,
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}
