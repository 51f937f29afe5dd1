//! CLI entry point for the hemovigilance pipeline.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use hemo_processing::{
    BreakdownDimension, FetchOutcome, FilterCriteria, Pipeline, PipelineConfig,
    PipelineConfigBuilder,
};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Hemovigilance dataset ingestion and anomaly scoring",
    long_about = "Loads the hemovigilance open dataset from the first usable tier \
                  (processed, backup, original), scores anomalies with an isolation \
                  forest and serves filtered views.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  HEMO_DATA_DIR    Directory holding the tier files\n  \
                  HEMO_DATA_URL    Upstream dataset URL\n\n\
                  EXAMPLES:\n  \
                  # Show which tier is loaded and how many rows it has\n  \
                  hemo-processing status\n\n  \
                  # Pull the latest publication\n  \
                  hemo-processing refresh\n\n  \
                  # Export São Paulo records from 2023\n  \
                  hemo-processing export -o sp-2023.csv --region SP --year 2023\n\n  \
                  # Notifications and anomalies per state\n  \
                  hemo-processing breakdown region"
)]
struct Args {
    /// Directory holding the tier files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Upstream dataset URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Expected share of anomalous rows (0.0 - 0.5]
    #[arg(long, global = true)]
    contamination: Option<f64>,

    /// Seed for the isolation forest
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// JSON file with a full pipeline configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print results as JSON on stdout; disables logging
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show availability, source tier and last update
    Status,
    /// Download the upstream dataset and replace the processed tier
    Refresh,
    /// Distinct regions, reaction types and years
    Options,
    /// Record and anomaly counts for a filtered view
    Summary(FilterArgs),
    /// Record and anomaly counts per year, region or reaction type
    Breakdown {
        #[arg(value_enum)]
        dimension: Dimension,

        #[command(flatten)]
        filters: FilterArgs,
    },
    /// List columns that hold personal data
    Sensitive,
    /// Write a filtered view as a `;`-delimited ISO-8859-1 file
    Export {
        /// Destination file
        #[arg(short, long)]
        output: PathBuf,

        /// Mask columns that hold personal data
        #[arg(long)]
        anonymize: bool,

        #[command(flatten)]
        filters: FilterArgs,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Dimension {
    Year,
    Region,
    ReactionType,
}

impl From<Dimension> for BreakdownDimension {
    fn from(dimension: Dimension) -> Self {
        match dimension {
            Dimension::Year => Self::Year,
            Dimension::Region => Self::Region,
            Dimension::ReactionType => Self::ReactionType,
        }
    }
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct FilterArgs {
    /// Region code (repeatable)
    #[arg(long = "region")]
    regions: Vec<String>,

    /// Reaction type (repeatable)
    #[arg(long = "reaction-type")]
    reaction_types: Vec<String>,

    /// Occurrence year (repeatable)
    #[arg(long = "year")]
    years: Vec<i32>,

    /// First day included (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day included (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl From<FilterArgs> for FilterCriteria {
    fn from(args: FilterArgs) -> Self {
        Self {
            regions: args.regions,
            reaction_types: args.reaction_types,
            years: args.years,
            date_from: args.from,
            date_to: args.to,
        }
    }
}

/// Initialize the tracing subscriber for logging.
///
/// With `--json` nothing is logged so stdout carries only the result.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file, then environment, then flags.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let base = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    let mut builder = PipelineConfigBuilder::from(base);

    if let Ok(dir) = env::var("HEMO_DATA_DIR") {
        debug!("Using HEMO_DATA_DIR={dir}");
        builder = builder.data_dir(dir);
    }
    if let Ok(url) = env::var("HEMO_DATA_URL") {
        debug!("Using HEMO_DATA_URL={url}");
        builder = builder.upstream_url(url);
    }

    if let Some(dir) = &args.data_dir {
        builder = builder.data_dir(dir);
    }
    if let Some(url) = &args.url {
        builder = builder.upstream_url(url);
    }
    if let Some(contamination) = args.contamination {
        builder = builder.contamination(contamination);
    }
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }

    Ok(builder.build()?)
}

fn emit<T: Serialize + std::fmt::Debug>(json: bool, value: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value:#?}");
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    let config = load_config(&args)?;
    info!("Using data directory {}", config.data_dir.display());
    let pipeline = Pipeline::builder().config(config).build()?;

    match args.command {
        Command::Status => {
            let status = pipeline.status();
            if args.json {
                emit(true, &status)?;
            } else {
                println!("Status:        {}", status.status);
                println!("Records:       {}", status.total_records);
                println!(
                    "Tier:          {}",
                    status.tier.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
                );
                println!(
                    "Last updated:  {}",
                    status.last_updated.as_deref().unwrap_or("N/A")
                );
            }
        }
        Command::Refresh => {
            let outcome = pipeline
                .refresh()
                .with_context(|| format!("refresh from {} failed", pipeline.config().upstream_url))?;
            if args.json {
                emit(true, &outcome)?;
            } else {
                match outcome {
                    FetchOutcome::Replaced { path, rows } => {
                        println!("Replaced {} with {} rows", path.display(), rows)
                    }
                    FetchOutcome::Empty => println!("Upstream table is empty; nothing replaced"),
                }
            }
        }
        Command::Options => emit(args.json, &pipeline.filter_options()?)?,
        Command::Summary(filters) => {
            let summary = pipeline.summary(&filters.into())?;
            if args.json {
                emit(true, &summary)?;
            } else {
                println!("Records:    {}", summary.total_records);
                println!("Anomalies:  {}", summary.total_anomalies);
                println!("Share:      {:.2}%", summary.anomaly_percentage);
            }
        }
        Command::Breakdown { dimension, filters } => {
            let rows = pipeline.breakdown(&filters.into(), dimension.into())?;
            if args.json {
                emit(true, &rows)?;
            } else {
                for row in &rows {
                    println!("{:<40} {:>8} {:>8}", row.value, row.records, row.anomalies);
                }
            }
        }
        Command::Sensitive => emit(args.json, &pipeline.sensitive_columns()?)?,
        Command::Export {
            output,
            anonymize,
            filters,
        } => {
            let criteria: FilterCriteria = filters.into();
            let bytes = if anonymize {
                pipeline.export_anonymized_csv(&criteria)?
            } else {
                pipeline.export_csv(&criteria)?
            };
            if bytes.is_empty() {
                return Err(anyhow!("export produced no data"));
            }
            std::fs::write(&output, &bytes)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("Wrote {} bytes to {}", bytes.len(), output.display());
        }
    }

    Ok(())
}
