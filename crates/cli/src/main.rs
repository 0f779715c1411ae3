use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use autoatlas::map::PolygonStore;
use autoatlas::probe::{HttpProbe, ReachabilityProbe};
use autoatlas::wizard::{DataStep, OutputStep, StyleStep};
use autoatlas::{
    BaseMapProvider, BatchPipeline, BatchStatus, CancellationToken, Collaborators, ConfigWizard,
    ReportConfig, TerritorialUnit,
};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Batch generation of per-unit atlas reports.
///
/// Fonts are looked up under `assets/fonts` or in the directory named by the
/// `AUTOATLAS_FONTS_DIR` environment variable; PDF output requires them.
#[derive(Parser)]
#[command(author, version, about = "Generate one map report per territorial unit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every unit and write `batch_summary.json` next to the reports.
    #[command(name = "generate", aliases = ["run", "batch"])]
    Generate(RunArgs),

    /// Render the first unit as a 96 DPI PNG page.
    #[command(name = "preview")]
    Preview {
        #[command(flatten)]
        run: RunArgs,
        /// Directory for the preview image; defaults to the configured output directory.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Check whether a base map provider answers within the timeout.
    #[command(name = "probe")]
    Probe {
        /// Provider name, e.g. `open_street_map` or `carto_positron`.
        #[arg(long, value_parser = parse_provider, default_value = "open_street_map")]
        provider: BaseMapProvider,
        #[arg(long, default_value_t = 1500)]
        timeout_ms: u64,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML file with `[data]`, `[style]` and `[output]` sections.
    #[arg(long, short)]
    config: PathBuf,
    /// JSON array of territorial units.
    #[arg(long, short)]
    units: PathBuf,
    /// JSON polygon store with unit shapes and context layers.
    #[arg(long, short)]
    geometry: PathBuf,
    /// Overrides the output directory of the config file.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

/// Layout of the config file: one table per wizard step.
#[derive(Deserialize)]
struct ConfigFile {
    data: DataStep,
    #[serde(default)]
    style: StyleStep,
    #[serde(default)]
    output: OutputStep,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Generate(args) => generate(&args),
        Commands::Preview { run, dir } => preview(&run, dir.as_deref()),
        Commands::Probe {
            provider,
            timeout_ms,
        } => probe(provider, timeout_ms),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {}", err);
            print_error_sources(err.as_ref());
            std::process::exit(1);
        }
    }
}

fn generate(args: &RunArgs) -> Result<i32, Box<dyn Error>> {
    let pipeline = prepare(args)?;
    let summary = pipeline.run_with(&CancellationToken::new(), |index, total, name| {
        info!("[{}/{}] {}", index + 1, total, name);
    });

    print!("{}", summary);
    Ok(match summary.status {
        BatchStatus::Tripped { .. } => 2,
        BatchStatus::Completed | BatchStatus::Cancelled => 0,
    })
}

fn preview(args: &RunArgs, dir: Option<&Path>) -> Result<i32, Box<dyn Error>> {
    let pipeline = prepare(args)?;
    let dir = dir.unwrap_or_else(|| pipeline.output_dir()).to_path_buf();
    fs::create_dir_all(&dir)?;
    let path = pipeline.preview(&dir)?;
    println!("{}", path.display());
    Ok(0)
}

fn probe(provider: BaseMapProvider, timeout_ms: u64) -> Result<i32, Box<dyn Error>> {
    let template = provider
        .tile_template()
        .ok_or("provider 'none' has no remote endpoint to probe")?;
    let url = template.probe_url();
    let outcome = HttpProbe::new().probe(&url, Duration::from_millis(timeout_ms));
    println!("{} ({}): {:?}", provider.display_name(), url, outcome);
    Ok(if outcome.is_reachable() { 0 } else { 2 })
}

fn prepare(args: &RunArgs) -> Result<BatchPipeline, Box<dyn Error>> {
    let config = load_config(&args.config, args.output.as_deref())?;
    let units: Vec<TerritorialUnit> = read_json(&args.units)?;
    let geometry: PolygonStore = read_json(&args.geometry)?;
    info!(
        "Loaded {} units and {} geometries",
        units.len(),
        geometry.unit_count()
    );

    let collaborators = Collaborators::http(Arc::new(geometry))?;
    Ok(BatchPipeline::prepare(config, units, collaborators)?)
}

fn read_text(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("reading {}: {}", path.display(), err))
}

fn load_config(path: &Path, output: Option<&Path>) -> Result<ReportConfig, Box<dyn Error>> {
    let text = read_text(path)?;
    let mut file: ConfigFile = toml::from_str(&text)?;
    if let Some(output) = output {
        file.output.output_dir = output.to_path_buf();
    }

    let mut wizard = ConfigWizard::new();
    wizard.submit_data(file.data)?;
    wizard.submit_style(file.style)?;
    wizard.submit_output(file.output)?;
    Ok(wizard.finish()?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let text = read_text(path)?;
    Ok(serde_json::from_str(&text).map_err(|err| format!("parsing {}: {}", path.display(), err))?)
}

fn parse_provider(value: &str) -> Result<BaseMapProvider, String> {
    serde_json::from_value(serde_json::Value::String(value.to_owned()))
        .map_err(|_| format!("unknown base map provider '{}'", value))
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
