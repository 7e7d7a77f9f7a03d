use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use rsa_post::config::AnalysisConfig;
use rsa_post::sample::write_sample_tree;

/// Write a synthetic data/ and res/ tree for the configured model and panels.
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let stats = write_sample_tree(&config, cli.seed)?;
    println!(
        "Wrote {} MAT-files and {} npy files under {} and {}",
        stats.mat_files,
        stats.npy_files,
        config.data_dir.display(),
        config.res_dir.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
