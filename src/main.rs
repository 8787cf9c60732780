use cancellable_loops::CancellationToken;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ctw_sla_filter::{
    run_extraction, run_reconstruction, DataFormat, ProductCase, Result, RunConfig,
};
use env_logger::{Builder, Env};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "ctw-sla-filter", version, about)]
struct Cli {
    /// JSON run configuration; flags below override its fields.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    case: Option<ProductCase>,

    #[arg(long, value_enum)]
    format: Option<DataFormat>,

    /// Directory holding the daily snapshots.
    #[arg(long)]
    input_dir: Option<PathBuf>,

    #[arg(long)]
    series_dir: Option<PathBuf>,

    #[arg(long)]
    grid_dir: Option<PathBuf>,

    /// First date, YYYY-MM-DD.
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last date (inclusive), YYYY-MM-DD.
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Snapshot date used to select points and shape grids.
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// Low cutoff in cycles per day.
    #[arg(long)]
    lowcut: Option<f64>,

    /// High cutoff in cycles per day.
    #[arg(long)]
    highcut: Option<f64>,

    #[arg(long)]
    order: Option<usize>,

    #[arg(long)]
    search_radius: Option<usize>,

    /// Worker threads, 0 for all cores.
    #[arg(long)]
    workers: Option<usize>,

    /// Time budget per point in seconds.
    #[arg(long)]
    task_timeout: Option<u64>,

    /// Read snapshots per point and date instead of caching them.
    #[arg(long)]
    no_preload: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Extract and filter one series per grid point of the region.
    Extract,
    /// Rebuild daily grids from the persisted series.
    Reconstruct,
    /// Extract, then reconstruct.
    Run,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(case) = self.case {
            config.case = case;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(dir) = &self.input_dir {
            config.input_dir = dir.clone();
        }
        if let Some(dir) = &self.series_dir {
            config.series_dir = dir.clone();
        }
        if let Some(dir) = &self.grid_dir {
            config.grid_dir = dir.clone();
        }
        if let Some(date) = self.start {
            config.start_date = date;
        }
        if let Some(date) = self.end {
            config.end_date = date;
        }
        if self.reference_date.is_some() {
            config.reference_date = self.reference_date;
        }
        if let Some(lowcut) = self.lowcut {
            config.band_pass.lowcut = lowcut;
        }
        if let Some(highcut) = self.highcut {
            config.band_pass.highcut = highcut;
        }
        if let Some(order) = self.order {
            config.band_pass.order = order;
        }
        if let Some(radius) = self.search_radius {
            config.search_radius = radius;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.task_timeout.is_some() {
            config.task_timeout_secs = self.task_timeout;
        }
        if self.no_preload {
            config.preload = false;
        }
        Ok(config)
    }
}

fn execute(cli: &Cli) -> Result<()> {
    let config = cli.run_config()?;
    let filter = config.validate()?;
    log::info!(
        "{:?} snapshots from {} to {}",
        config.case,
        config.start_date,
        config.end_date
    );
    let token = CancellationToken::new();

    if matches!(cli.command, Commands::Extract | Commands::Run) {
        run_extraction(&config, &filter, &token)?;
    }
    if matches!(cli.command, Commands::Reconstruct | Commands::Run) {
        run_reconstruction(&config, &token)?;
    }
    Ok(())
}

fn main() {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    builder.init();

    let cli = Cli::parse();
    if let Err(err) = execute(&cli) {
        log::error!("{err}");
        process::exit(1);
    }
}
