use std::process::ExitCode;

use camino::Utf8PathBuf;
use chrono::{Days, Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use firms_incidents::config::{ConfigLoader, ResolvedConfig};
use firms_incidents::domain::{BoundingBox, parse_date};
use firms_incidents::error::FirmsError;
use firms_incidents::firms::{ArchiveFetcher, FirmsHttpClient};
use firms_incidents::geofence::{GeoJsonBorderProvider, Geofence};
use firms_incidents::output::{JsonOutput, RegionListing, StderrProgress, write_csv_atomic};
use firms_incidents::pipeline::{Pipeline, ProgressSink, RunOutcome, RunRequest};
use firms_incidents::region::{BuiltinRegions, RegionRequest, RegionResolver, RegionTables};

#[derive(Parser)]
#[command(name = "firms-incidents")]
#[command(about = "Fetch FIRMS fire detections for a region and group them into incidents")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    /// print progress lines on stderr
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch, geofence and cluster detections for a region")]
    Run(RunArgs),
    #[command(about = "List registered datasets and their availability")]
    Datasets,
    #[command(about = "List known countries and subdivisions")]
    Regions,
}

#[derive(Args)]
struct RunArgs {
    /// country name, e.g. "Afghanistan"
    country: Option<String>,

    #[arg(long)]
    state: Option<String>,

    /// min_lon,min_lat,max_lon,max_lat
    #[arg(long, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,

    #[arg(long)]
    dataset: Option<String>,

    /// YYYY-MM-DD, defaults to six days before --end
    #[arg(long, value_parser = parse_date)]
    start: Option<NaiveDate>,

    /// YYYY-MM-DD, defaults to today
    #[arg(long, value_parser = parse_date)]
    end: Option<NaiveDate>,

    #[arg(long)]
    chunk_days: Option<u32>,

    #[arg(long)]
    eps: Option<f64>,

    #[arg(long)]
    min_samples: Option<usize>,

    #[arg(long)]
    max_days: Option<u32>,

    /// filter against country borders, not just the bounding box
    #[arg(long)]
    strict: bool,

    #[arg(long)]
    no_cluster: bool,

    /// keep only clusters seen on more than one date
    #[arg(long)]
    multi_day: bool,

    /// also write the labelled detections to this CSV file
    #[arg(long)]
    csv: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(firms) = report.downcast_ref::<FirmsError>() {
            return ExitCode::from(map_exit_code(firms));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FirmsError) -> u8 {
    if error.is_invalid_request() {
        2
    } else if error.is_upstream() {
        3
    } else {
        1
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            if cli.progress {
                run_pipeline(args, config, &StderrProgress)
            } else {
                run_pipeline(args, config, &JsonOutput)
            }
        }
        Commands::Datasets => {
            JsonOutput::print_datasets(config.catalog.datasets()).into_diagnostic()
        }
        Commands::Regions => JsonOutput::print_regions(&region_listing()).into_diagnostic(),
    }
}

fn run_pipeline(args: RunArgs, config: ResolvedConfig, sink: &dyn ProgressSink) -> miette::Result<()> {
    let map_key = config.require_map_key()?.to_string();
    let request = build_request(&args, &config)?;

    let fetcher = ArchiveFetcher::new(
        FirmsHttpClient::new()?,
        &config.base_url,
        &map_key,
        config.default_timeout,
    );
    let geofence = Geofence::new(GeoJsonBorderProvider::new(config.border_dir.clone()));
    let pipeline = Pipeline::new(config.catalog, RegionResolver::default(), fetcher, geofence);

    let outcome = pipeline.run_today(&request, sink)?;
    if let (Some(path), RunOutcome::Completed(report)) = (&args.csv, &outcome) {
        write_csv_atomic(&report.detections, path)?;
    }
    if let RunOutcome::NoData(report) = &outcome {
        eprintln!("{}", report.reason);
    }
    JsonOutput::print_run(&outcome).into_diagnostic()
}

fn build_request(args: &RunArgs, config: &ResolvedConfig) -> Result<RunRequest, FirmsError> {
    if args.country.is_none() && args.bbox.is_none() {
        return Err(FirmsError::UnknownRegion(
            "pass a country or --bbox".to_string(),
        ));
    }
    let end = args.end.unwrap_or_else(|| Local::now().date_naive());
    let start = match args.start {
        Some(start) => start,
        None => end
            .checked_sub_days(Days::new(6))
            .ok_or_else(|| FirmsError::InvalidDate(end.to_string()))?,
    };
    let region = RegionRequest {
        country: args.country.clone(),
        subdivision: args.state.clone(),
        bbox: args.bbox,
    };

    let mut request = RunRequest::new(
        region,
        args.dataset.as_deref().unwrap_or(&config.dataset),
        start,
        end,
    );
    request.chunk_days = args.chunk_days.unwrap_or(config.chunk_days);
    request.strict = args.strict;
    request.multi_day_only = args.multi_day;
    request.clustering = if args.no_cluster {
        None
    } else {
        let mut params = config.clustering;
        params.eps = args.eps.unwrap_or(params.eps);
        params.min_samples = args.min_samples.unwrap_or(params.min_samples);
        params.max_time_diff_days = args.max_days.unwrap_or(params.max_time_diff_days);
        params.validate()?;
        Some(params)
    };
    Ok(request)
}

fn region_listing() -> Vec<RegionListing> {
    let tables = BuiltinRegions;
    tables
        .countries()
        .map(|country| RegionListing {
            country: country.to_string(),
            large: tables.is_large(country),
            subdivisions: tables
                .subdivisions(country)
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn run_args(args: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn western_bbox_parses_without_equals_sign() {
        let args = run_args(&["firms-incidents", "run", "--bbox", "-125.0,24.0,-66.0,50.0"]);
        assert_eq!(args.bbox.unwrap().to_string(), "-125.0,24.0,-66.0,50.0");
    }

    #[test]
    fn cli_eps_is_validated() {
        let config = ConfigLoader::resolve_config(firms_incidents::config::Config {
            border_dir: Some("/tmp/borders".to_string()),
            ..Default::default()
        })
        .unwrap();
        let args = run_args(&["firms-incidents", "run", "Afghanistan", "--eps", "0"]);
        assert_matches!(
            build_request(&args, &config),
            Err(FirmsError::InvalidClusterParams(_))
        );
        assert_eq!(map_exit_code(&FirmsError::InvalidClusterParams(String::new())), 2);
        assert_eq!(map_exit_code(&FirmsError::FirmsRejected(String::new())), 3);
    }
}
