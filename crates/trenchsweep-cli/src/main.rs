//! trenchsweep - sticking-probability sweeps for trench deposition
//!
//! ## Commands
//!
//! - `run`: sweep the simulator over a probability schedule and write the
//!   thickness tables
//! - `render`: print the parameter file one run would receive
//! - `summary`: top / bottom / sidewall thickness from written tables

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use trenchsweep_core::analysis::render_summary_table;
use trenchsweep_core::{
    summarize, template_values, ChainSelection, CsvResultSink, FailurePolicy, OutputLayout,
    ParameterTemplate, ProcessRunner, StickingProbability, SweepConfig, SweepOrchestrator,
    TablePaths, VtpExtractor, DEFAULT_BAND,
};

#[derive(Parser, Debug)]
#[command(name = "trenchsweep")]
#[command(version = trenchsweep_core::VERSION)]
#[command(about = "Sticking-probability sweeps over a level-set deposition simulator", long_about = None)]
struct Cli {
    /// Enable verbose output (simulator stdout included)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a sweep and write `<BASE>.csv`, `<BASE>_geometry.csv` and
    /// `<BASE>.manifest.json`
    Run(RunArgs),

    /// Print the rendered parameter file for one sticking probability
    Render(RenderArgs),

    /// Summarise the thickness tables of a finished sweep
    Summary {
        /// Output base name the sweep was run with
        output_base: PathBuf,

        /// Vertical tolerance for top/bottom/sidewall classification
        #[arg(long, default_value_t = DEFAULT_BAND)]
        band: f64,
    },
}

/// Options shared by every command that builds a sweep configuration.
#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// TOML sweep configuration
    #[arg(long, env = "TRENCHSWEEP_CONFIG")]
    config: Option<PathBuf>,

    /// Parameter template (defaults to the built-in deposition template)
    #[arg(long, env = "TRENCHSWEEP_TEMPLATE")]
    template: Option<PathBuf>,

    /// Simulator executable
    #[arg(long, env = "TRENCHSWEEP_EXECUTABLE")]
    executable: Option<PathBuf>,

    /// Working directory for simulator runs
    #[arg(long, env = "TRENCHSWEEP_PROJECT_DIR")]
    project_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Base name of the result files
    #[arg(default_value = "results")]
    output_base: PathBuf,

    /// Sticking probability in (0, 1]; repeat for several (default: 1, 1/2, ..., 1/4096)
    #[arg(short = 'p', long = "probability", value_parser = parse_probability)]
    probabilities: Vec<f64>,

    /// Simulations per sticking probability
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    repetitions: Option<u32>,

    /// Per-run wall-clock limit in seconds (0 = none)
    #[arg(long, env = "TRENCHSWEEP_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Log failed runs and continue instead of aborting
    #[arg(long)]
    skip_failed: bool,

    /// Keep the longest curve when an interface file holds several
    #[arg(long)]
    longest_chain: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Sticking probability to render
    #[arg(short = 'p', long = "probability", value_parser = parse_probability, default_value_t = 1.0)]
    probability: f64,

    #[command(flatten)]
    config: ConfigArgs,
}

fn parse_probability(raw: &str) -> std::result::Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("{raw:?} is not a number: {e}"))?;
    StickingProbability::new(value)
        .map(StickingProbability::value)
        .map_err(|e| e.to_string())
}

fn load_config(args: &ConfigArgs) -> Result<SweepConfig> {
    let mut config = match &args.config {
        Some(path) => SweepConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SweepConfig::default(),
    };
    if let Some(template) = &args.template {
        config.simulator.template = Some(template.clone());
    }
    if let Some(executable) = &args.executable {
        config.simulator.executable = executable.clone();
    }
    if let Some(project_dir) = &args.project_dir {
        config.simulator.project_dir = project_dir.clone();
    }
    Ok(config)
}

fn apply_run_args(config: &mut SweepConfig, args: &RunArgs) {
    if !args.probabilities.is_empty() {
        config.sweep.sticking_probabilities = args.probabilities.clone();
    }
    if let Some(repetitions) = args.repetitions {
        config.sweep.repetitions = repetitions;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.simulator.timeout_secs = timeout_secs;
    }
    if args.skip_failed {
        config.sweep.on_failure = FailurePolicy::SkipRun;
    }
    if args.longest_chain {
        config.sweep.chains = ChainSelection::Longest;
    }
}

fn load_template(config: &SweepConfig) -> Result<ParameterTemplate> {
    ParameterTemplate::load(config.simulator.template.as_deref())
        .context("Failed to load parameter template")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    trenchsweep_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Render(args) => {
            print!("{}", cmd_render(&args)?);
            Ok(())
        }
        Commands::Summary { output_base, band } => {
            print!("{}", cmd_summary(&output_base, band)?);
            Ok(())
        }
    }
}

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    apply_run_args(&mut config, args);
    config
        .validate()
        .context("Invalid sweep configuration")?;
    let template = load_template(&config)?;

    let layout = OutputLayout::new(
        config.resolve(&config.process.output_path),
        config.process.distance_bits,
    );
    let runner = ProcessRunner::new(
        config.executable(),
        config.project_root(),
        layout,
    )
    .with_timeout(config.simulator.timeout_secs);
    let extractor = VtpExtractor::new(config.sweep.chains);

    let paths = TablePaths::from_base(&args.output_base);
    let mut sink = CsvResultSink::create(&paths)
        .with_context(|| format!("Failed to create {}", paths.data.display()))?;

    info!(
        version = trenchsweep_core::VERSION,
        data = %paths.data.display(),
        executable = %config.executable().display(),
        "Starting sweep"
    );

    let orchestrator =
        SweepOrchestrator::new(config, template, Arc::new(runner), Arc::new(extractor))
            .with_manifest(&paths.manifest);

    tokio::select! {
        result = orchestrator.run(&mut sink) => {
            let summary = result.with_context(|| {
                format!("Sweep aborted; completed rows remain in {}", paths.data.display())
            })?;
            println!(
                "Completed {} run(s), {} failed, in {:.1}s",
                summary.completed,
                summary.failed,
                summary.duration_ms as f64 / 1000.0
            );
            println!("  data:     {}", paths.data.display());
            println!("  geometry: {}", paths.geometry.display());
            println!("  manifest: {}", paths.manifest.display());
            if !summary.manifest_current {
                warn!(manifest = %paths.manifest.display(), "Manifest could not be written; it does not reflect this sweep");
            }
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(data = %paths.data.display(), "Interrupted; simulator stopped, completed rows kept");
            bail!("Interrupted")
        }
    }
}

fn cmd_render(args: &RenderArgs) -> Result<String> {
    let config = load_config(&args.config)?;
    let template = load_template(&config)?;
    let geometry = config
        .process
        .geometry_files
        .first()
        .context("No geometry file configured")?;
    let p = StickingProbability::new(args.probability)?;
    Ok(template.render(&template_values(&config, geometry, p)))
}

fn cmd_summary(output_base: &Path, band: f64) -> Result<String> {
    let paths = TablePaths::from_base(output_base);
    let summaries = summarize(&paths, band)
        .with_context(|| format!("Failed to summarise {}", paths.data.display()))?;
    Ok(render_summary_table(&summaries))
}
