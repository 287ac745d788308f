#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the acre map toolchain.
//!
//! `prepare` turns a field's point measurements into the per-acre CSV,
//! `evaluate` compares regression models on that CSV, and `inspect`
//! summarises its predictors.
//!
//! Uses `indicatif-log-bridge` (via [`acre_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and the lookup progress bar never fight for the terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use acre_map_cli_utils::{IndicatifProgress, MultiProgress};
use acre_map_config::RunConfig;
use acre_map_evaluation::evaluate_models;
use acre_map_evaluation_models::{EvaluationReport, NitrogenCurveStatus, metric};
use acre_map_external::open_meteo::OpenMeteoClient;
use acre_map_external::ssurgo::SoilDataAccessClient;
use acre_map_features::{read_acre_csv, summarize_predictors, write_acre_csv};
use acre_map_grid::parse_boundary_geojson;
use acre_map_pipeline::{build_field_dataset, read_points_csv, write_field_dataset};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "acre_map", about = "Per-acre yield datasets and model evaluation")]
struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the per-acre dataset for one field
    Prepare {
        /// Run configuration (TOML)
        #[arg(long)]
        config: PathBuf,

        /// Point measurements (CSV)
        #[arg(long)]
        points: PathBuf,

        /// Field outline (`GeoJSON`, WGS84). Defaults to the hull of the
        /// yield points.
        #[arg(long)]
        boundary: Option<PathBuf>,

        /// Dataset path. Defaults to `acre_dataset.csv` in the
        /// configured output directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compare the configured models on a dataset
    Evaluate {
        /// Run configuration (TOML)
        #[arg(long)]
        config: PathBuf,

        /// Acre dataset (CSV)
        dataset: PathBuf,

        /// Write the full report as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Summarise the predictors of a dataset
    Inspect {
        /// Acre dataset (CSV)
        dataset: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = acre_map_cli_utils::init_logger(cli.verbose);

    match cli.command {
        Commands::Prepare {
            config,
            points,
            boundary,
            output,
        } => {
            let config = RunConfig::load(&config)?;
            prepare(&config, &points, boundary.as_deref(), output, &multi).await?;
        }
        Commands::Evaluate {
            config,
            dataset,
            output,
        } => {
            let config = RunConfig::load(&config)?;
            let rows = read_acre_csv(&dataset)?;
            let report = evaluate_models(&rows, &config)?;
            print_report(&report);

            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
                log::info!("Wrote evaluation report to {}", path.display());
            }
        }
        Commands::Inspect { dataset } => {
            let rows = read_acre_csv(&dataset)?;
            println!("{}", summarize_predictors(&rows));
        }
    }

    Ok(())
}

async fn prepare(
    config: &RunConfig,
    points_path: &Path,
    boundary_path: Option<&Path>,
    output: Option<PathBuf>,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let points = read_points_csv(points_path)?;
    let boundary = match boundary_path {
        Some(path) => Some(parse_boundary_geojson(&std::fs::read_to_string(path)?)?),
        None => None,
    };

    let weather = Arc::new(OpenMeteoClient::new(&config.external.weather)?);
    let soil = Arc::new(SoilDataAccessClient::new(&config.external.soil)?);
    let progress = IndicatifProgress::lookups_bar(multi, "External lookups");

    let dataset = build_field_dataset(
        config,
        &points,
        boundary.as_ref(),
        weather,
        soil,
        &progress,
    )
    .await?;

    let path = match output {
        Some(path) => {
            write_acre_csv(&path, &dataset.records)?;
            path
        }
        None => write_field_dataset(&dataset, &config.field.output_dir())?,
    };

    println!(
        "{} acres written to {} ({} phantom acres removed, {} with incomplete external data)",
        dataset.records.len(),
        path.display(),
        dataset.phantom.rejected.len(),
        dataset.attributes.incomplete_cells.len()
    );
    Ok(())
}

fn print_report(report: &EvaluationReport) {
    for label in report.split_labels() {
        println!();
        println!("{label}");
        println!(
            "{:<4} {:<20} {:>10} {:>10} {:>10}",
            "RANK", "MODEL", "TEST R²", "TEST RMSE", "TRAIN R²"
        );
        println!("{}", "-".repeat(58));
        for (rank, (model, test_r2)) in report
            .ranked_models(&label, metric::TEST_R2)
            .iter()
            .enumerate()
        {
            let rmse = report.mean_metric(model, &label, metric::TEST_RMSE);
            let train_r2 = report.mean_metric(model, &label, metric::TRAIN_R2);
            println!(
                "{:<4} {model:<20} {test_r2:>10.3} {:>10} {:>10}",
                rank + 1,
                format_metric(rmse),
                format_metric(train_r2)
            );
        }
    }

    if !report.skipped_models.is_empty() {
        println!();
        println!(
            "Skipped (not built in): {}",
            report.skipped_models.join(", ")
        );
    }

    let curve = &report.nitrogen_curve;
    println!();
    println!("Nitrogen response ({} acres)", curve.observations);
    if let Some(c) = &curve.coefficients {
        println!("  yield = {:.3} + {:.4}·N + {:.6}·N²", c.a, c.b, c.c);
    }
    match &curve.status {
        NitrogenCurveStatus::Concave {
            optimal_rate,
            predicted_yield,
            extrapolated,
        } => {
            println!(
                "  optimal rate {optimal_rate:.1} lb/ac, predicted yield {predicted_yield:.1} bu/ac"
            );
            if *extrapolated {
                println!("  warning: the optimal rate lies outside the applied rates");
            }
        }
        NitrogenCurveStatus::NonConcave => {
            println!("  curve does not bend down; no rate recommended");
        }
        NitrogenCurveStatus::InsufficientData => {
            println!("  not enough distinct nitrogen rates to fit");
        }
    }
}

fn format_metric(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}
