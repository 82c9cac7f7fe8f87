use std::path::Path;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_expression_set::app::{App, FetchOptions, SubsetRequest, parse_filter};
use kira_expression_set::config::ConfigLoader;
use kira_expression_set::domain::GeoSeriesAccession;
use kira_expression_set::error::KiraError;
use kira_expression_set::geo::{GeoClient, GeoHttpClient};
use kira_expression_set::output::{JsonOutput, LogSink, OutputMode, TextOutput};
use kira_expression_set::store::Store;

#[derive(Parser)]
#[command(name = "kira-es")]
#[command(about = "Synchronized expression sets: load, subset and fetch microarray data")]
#[command(version, author)]
struct Cli {
    /// Emit JSON on stdout instead of a terminal summary.
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Load the dataset described by kira-es.json and describe it")]
    Load(ConfigArgs),
    #[command(about = "Per-sample descriptive statistics")]
    Summary(SummaryArgs),
    #[command(about = "Select samples and features, keeping annotations aligned")]
    Subset(SubsetArgs),
    #[command(about = "Fetch GEO series matrix files into the cache")]
    Fetch(FetchArgs),
    #[command(about = "List cached GEO downloads")]
    Cache,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    #[arg(long)]
    config: Option<String>,
}

#[derive(Args, Clone)]
struct SummaryArgs {
    #[arg(long)]
    config: Option<String>,

    /// Count samples per value of this covariate.
    #[arg(long)]
    by: Option<String>,
}

#[derive(Args, Clone)]
struct SubsetArgs {
    #[arg(long)]
    config: Option<String>,

    /// Sample ids, in the order they should appear.
    #[arg(long, value_delimiter = ',', conflicts_with = "filter")]
    samples: Option<Vec<String>>,

    /// Feature ids, in the order they should appear.
    #[arg(long, value_delimiter = ',')]
    features: Option<Vec<String>>,

    /// Keep samples whose covariate equals a value (`key=value`).
    #[arg(long = "where", value_name = "KEY=VALUE")]
    filter: Option<String>,
}

#[derive(Args, Clone)]
struct FetchArgs {
    #[arg(required = true)]
    accessions: Vec<String>,

    #[arg(long)]
    force: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::Alignment { .. }
        | KiraError::Cardinality { .. }
        | KiraError::Lookup { .. }
        | KiraError::PositionOutOfRange { .. }
        | KiraError::DuplicateIdentifier { .. }
        | KiraError::MissingFeatureIds
        | KiraError::MissingConfig => 2,
        KiraError::GeoHttp(_) | KiraError::GeoStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let store = Store::new()?;

    match cli.command {
        Commands::Load(args) => run_load(args, App::new(store, NopGeo), output_mode),
        Commands::Summary(args) => run_summary(args, App::new(store, NopGeo), output_mode),
        Commands::Subset(args) => run_subset(args, App::new(store, NopGeo), output_mode),
        Commands::Fetch(args) => {
            let geo = GeoHttpClient::new()?;
            run_fetch(args, App::new(store, geo), output_mode)
        }
        Commands::Cache => run_cache(App::new(store, NopGeo), output_mode),
    }
}

fn run_load<G: GeoClient>(
    args: ConfigArgs,
    app: App<G>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    match output_mode {
        OutputMode::NonInteractive => {
            let report = app.describe(&config, &JsonOutput)?;
            JsonOutput::print_dataset(&report).into_diagnostic()
        }
        OutputMode::Interactive => {
            let report = app.describe(&config, &LogSink)?;
            TextOutput::print_dataset(&report).into_diagnostic()
        }
    }
}

fn run_summary<G: GeoClient>(
    args: SummaryArgs,
    app: App<G>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.summary(&config, args.by.as_deref(), &JsonOutput)?;
            JsonOutput::print_summary(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.summary(&config, args.by.as_deref(), &LogSink)?;
            TextOutput::print_summary(&result).into_diagnostic()
        }
    }
}

fn run_subset<G: GeoClient>(
    args: SubsetArgs,
    app: App<G>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let request = SubsetRequest {
        samples: args.samples,
        features: args.features,
        filter: args.filter.as_deref().map(parse_filter).transpose()?,
    };
    match output_mode {
        OutputMode::NonInteractive => {
            let report = app.subset(&config, &request, &JsonOutput)?;
            JsonOutput::print_dataset(&report).into_diagnostic()
        }
        OutputMode::Interactive => {
            let report = app.subset(&config, &request, &LogSink)?;
            TextOutput::print_dataset(&report).into_diagnostic()
        }
    }
}

fn run_fetch<G: GeoClient>(
    args: FetchArgs,
    app: App<G>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let accessions = args
        .accessions
        .iter()
        .map(|value| value.parse::<GeoSeriesAccession>())
        .collect::<Result<Vec<_>, _>>()?;
    let options = FetchOptions { force: args.force };

    for accession in &accessions {
        match output_mode {
            OutputMode::NonInteractive => {
                let result = app.fetch(accession, options.clone(), &JsonOutput)?;
                JsonOutput::print_fetch(&result).into_diagnostic()?;
            }
            OutputMode::Interactive => {
                let result = app.fetch(accession, options.clone(), &LogSink)?;
                TextOutput::print_fetch(&result).into_diagnostic()?;
            }
        }
    }
    Ok(())
}

fn run_cache<G: GeoClient>(app: App<G>, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.cached(&JsonOutput)?;
            JsonOutput::print_cache(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let result = app.cached(&LogSink)?;
            TextOutput::print_cache(&result).into_diagnostic()
        }
    }
}

/// Stand-in client for commands that never reach GEO.
struct NopGeo;

impl GeoClient for NopGeo {
    fn list_series_matrix_files(
        &self,
        _accession: &GeoSeriesAccession,
    ) -> Result<Vec<String>, KiraError> {
        Err(KiraError::GeoHttp("GEO client not configured".to_string()))
    }

    fn download_series_matrix(
        &self,
        _accession: &GeoSeriesAccession,
        _file_name: &str,
        _destination: &Path,
    ) -> Result<(), KiraError> {
        Err(KiraError::GeoHttp("GEO client not configured".to_string()))
    }
}
