use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use rsa_post::analysis::selection::run_selection;
use rsa_post::config::AnalysisConfig;
use rsa_post::figure::{presets, render, ScoreGrid};
use rsa_post::report;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "rsa-post.json";

#[derive(Parser)]
#[command(name = "rsa-post", version, about = "Post-hoc RSA of pruned and ANOVA-selected units")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print per-layer selection summaries.
    Selection(SelectionArgs),
    /// Render the score figure as PNG.
    Plot(PlotArgs),
    /// Write the default configuration as JSON.
    InitConfig {
        #[arg(default_value = DEFAULT_CONFIG)]
        path: PathBuf,
    },
}

#[derive(Args)]
struct SelectionArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    dataset: Option<String>,
    /// `behavior` or an fMRI region such as IPS345.
    #[arg(long)]
    brain_area: Option<String>,
    /// Also write the summaries to this CSV file.
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Print JSON instead of the plain two-line summary.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PlotArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(flatten)]
    source: ScoreSource,
    /// Model name used in panel titles and the default output file name.
    #[arg(long)]
    model_name: Option<String>,
    #[arg(long)]
    out: Option<PathBuf>,
    /// Also write the plotted scores as JSON, readable again with `--scores`.
    #[arg(long)]
    save_scores: Option<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ScoreSource {
    /// Published scores: cornet-s or cornet-z.
    #[arg(long)]
    preset: Option<String>,
    /// Scores JSON file (`null` marks a missing score).
    #[arg(long)]
    scores: Option<PathBuf>,
    /// Run the selection analysis for every configured panel.
    #[arg(long)]
    from_results: bool,
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            log::info!("Using {DEFAULT_CONFIG}");
            Ok(AnalysisConfig::load(Path::new(DEFAULT_CONFIG))?)
        }
        None => Ok(AnalysisConfig::default()),
    }
}

fn selection(args: SelectionArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(dataset) = args.dataset {
        config.dataset = dataset;
    }
    if let Some(area) = args.brain_area {
        config.brain_area = area;
    }
    config.validate()?;

    let summaries = run_selection(&config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.json {
        report::print_json(&mut out, &summaries)?;
    } else {
        report::print_summaries(&mut out, &summaries)?;
    }
    out.flush()?;

    if let Some(path) = args.csv {
        report::write_csv(&path, &summaries)?;
    }
    Ok(())
}

fn plot(args: PlotArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let source = args.source;

    let grid = if let Some(name) = source.preset {
        match presets::by_name(&name) {
            Some(grid) => grid?,
            None => bail!("unknown preset '{name}' (expected cornet-s or cornet-z)"),
        }
    } else if let Some(path) = source.scores {
        ScoreGrid::load_json(&path)
            .with_context(|| format!("Failed to load scores {}", path.display()))?
    } else {
        let model_name = args.model_name.as_deref().unwrap_or(&config.model);
        let mut panels = Vec::with_capacity(config.panels.len());
        for panel in &config.panels {
            let summaries = run_selection(&config.with_dataset(&panel.dataset))
                .with_context(|| format!("panel {}", panel.label))?;
            panels.push((panel.label.clone(), summaries));
        }
        ScoreGrid::from_summaries(model_name, &panels)?
    };

    if let Some(path) = &args.save_scores {
        grid.save_json(path)
            .with_context(|| format!("Failed to write scores {}", path.display()))?;
        log::info!("Wrote scores to {}", path.display());
    }

    let model_name = args.model_name.unwrap_or_else(|| grid.model_name.clone());
    let out = args.out.unwrap_or_else(|| config.figure_path(&model_name));
    render(&grid, &config.figure, &out)
        .with_context(|| format!("Failed to render {}", out.display()))?;
    println!("{}", out.display());
    Ok(())
}

fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    AnalysisConfig::default().save(path)?;
    log::info!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Selection(args) => selection(args),
        Command::Plot(args) => plot(args),
        Command::InitConfig { path } => init_config(&path),
    }
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
