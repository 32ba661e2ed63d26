//! Tabforge - Main Entry Point

use clap::Parser;
use tabforge::cli::{cmd_info, cmd_predict, cmd_preprocess, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabforge=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Preprocess { data, output, target, fill_categories, no_scale_encoded } => {
            cmd_preprocess(&data, &output, target.as_deref(), fill_categories, no_scale_encoded)?;
        }
        Commands::Train { data, target, task, seed, n_estimators, output, config } => {
            cmd_train(&data, &target, &task, seed, n_estimators, output.as_deref(), config.as_deref())?;
        }
        Commands::Predict { model, data, output } => {
            cmd_predict(&model, &data, output.as_deref())?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
