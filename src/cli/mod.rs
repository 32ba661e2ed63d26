//! Tabforge CLI Module
//!
//! Command-line interface for preprocessing, training, prediction and data
//! inspection over local CSV files.

use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::export::ModelArtifact;
use crate::pipeline::{run_pipeline, PipelineConfig};
use crate::preprocessing::{DataPreprocessor, ImputeStrategy, PreprocessingConfig};
use crate::training::TaskType;
use crate::utils::{DataLoader, DataSaver};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "tabforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tabular preprocessing and random forest training")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Impute, label-encode and standardize a CSV file
    Preprocess {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Column to leave out of imputation and scaling
        #[arg(short, long)]
        target: Option<String>,

        /// Fill missing categories with the most frequent value instead of failing
        #[arg(long)]
        fill_categories: bool,

        /// Keep label codes unscaled
        #[arg(long)]
        no_scale_encoded: bool,
    },

    /// Train a random forest and save it with its preprocessor
    Train {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// Task type (classification, regression)
        #[arg(long, default_value = "classification")]
        task: String,

        /// Seed of the train/test split
        #[arg(long)]
        seed: Option<u64>,

        /// Number of trees
        #[arg(long)]
        n_estimators: Option<usize>,

        /// Output model file (defaults to ../models/<task>_model.pkl)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pipeline configuration file (JSON); flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Make predictions using a trained model
    Predict {
        /// Trained model file
        #[arg(short, long)]
        model: PathBuf,

        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV file (input columns plus a `prediction` column)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show data information
    Info {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,
    },
}

// ─── Data loading ──────────────────────────────────────────────────────────────

pub fn load_data(path: &Path) -> anyhow::Result<DataFrame> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if ext != "csv" {
        anyhow::bail!("Unsupported file format: {}", ext);
    }
    Ok(DataLoader::new().load_csv(path)?)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_preprocess(
    data_path: &Path,
    output_path: &Path,
    target: Option<&str>,
    fill_categories: bool,
    no_scale_encoded: bool,
) -> anyhow::Result<()> {
    section("Preprocess");

    step_run("Loading data");
    let df = load_data(data_path)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    let mut config = PreprocessingConfig::default().with_scale_encoded(!no_scale_encoded);
    if let Some(target) = target {
        config = config.with_target(target);
    }
    if fill_categories {
        config = config.with_categorical_impute(ImputeStrategy::MostFrequent);
    }

    step_run("Processing");
    let start = Instant::now();
    let mut preprocessor = DataPreprocessor::with_config(config);
    let mut processed = preprocessor.fit_transform(&df)?;
    step_done(&format!("{:?}", start.elapsed()));

    step_run(&format!("Saving → {}", output_path.display()));
    DataSaver::save_csv(&mut processed, output_path)?;
    step_done(&format!("{} rows × {} cols", processed.height(), processed.width()));

    println!();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_train(
    data_path: &Path,
    target: &str,
    task_type: &str,
    seed: Option<u64>,
    n_estimators: Option<usize>,
    output: Option<&Path>,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    section("Train");

    let task: TaskType = task_type.parse()?;

    let mut config = match config_path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    config.task = task;
    config.target_column = target.to_string();
    if let Some(seed) = seed {
        config.trainer.split_seed = Some(seed);
    }
    if let Some(n) = n_estimators {
        config.trainer.n_estimators = n;
    }
    if let Some(path) = output {
        config.trainer.model_path = Some(path.to_path_buf());
    }

    step_run("Loading data");
    let start = Instant::now();
    let df = load_data(data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    step_run(&format!("Training {}", task.to_string().cyan()));
    let start = Instant::now();
    let outcome = run_pipeline(&df, &config)?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    if let Some(line) = outcome.metrics.headline_line() {
        println!("{}", line);
    }
    println!("  {:<16} {}", muted("Train rows"), outcome.metrics.n_train);
    println!("  {:<16} {}", muted("Test rows"), outcome.metrics.n_test);
    println!("  {:<16} {}", muted("Model"), outcome.model_path.display().to_string().white());
    println!();

    Ok(())
}

pub fn cmd_predict(
    model_path: &Path,
    data_path: &Path,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let artifact = ModelArtifact::load(model_path)?;
    step_done(&format!("{} ({})", artifact.metadata.name, artifact.metadata.task));

    step_run("Loading data");
    let df = load_data(data_path)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    let labels = artifact.predict_labels(&df)?;

    match output {
        Some(path) => {
            let mut out = df.clone();
            out.with_column(Series::new("prediction".into(), labels))?;
            DataSaver::save_csv(&mut out, path)?;
            println!("  {} {}", ok("✓"), format!("Predictions → {}", path.display()));
        }
        None => {
            for label in &labels {
                println!("{}", label);
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let info = DataLoader::new().get_file_info(data_path)?;

    println!("  {:<12} {}", muted("File"), info.path);
    println!("  {:<12} {}", muted("Rows"), info.n_rows);
    println!("  {:<12} {}", muted("Columns"), info.n_cols);
    println!("  {:<12} {:.2} KB", muted("Size"), info.file_size as f64 / 1024.0);
    println!();

    println!("  {:<20} {:<12} {:>6}", muted("Column"), muted("Type"), muted("Nulls"));
    println!("  {}", dim(&"─".repeat(40)));

    for col in &info.columns {
        println!(
            "  {:<20} {:<12} {:>6}",
            col.name,
            col.dtype.truecolor(140, 140, 140),
            col.null_count
        );
    }

    println!();
    Ok(())
}
