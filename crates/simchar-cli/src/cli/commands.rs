use super::CliError;
use super::helpers::*;
use simchar_core::analysis::{
    AnalysisOutcome, ArtifactNaming, ResultsAggregator, ResultsTable, correlation_plot,
    emittance_plot,
};
use simchar_core::config::AnalysisConfig;
use simchar_core::histogram::Binning;
use simchar_core::plotting::{PlotExporter, PlottersExporter};
use simchar_core::records::RecordTable;
use simchar_core::report::{ReportMode, ReportWriter};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(clap::Args)]
pub(super) struct AnalyzeArgs {
    /// SIMION trajectory table
    input: PathBuf,

    /// Variables to fit, comma separated (overrides the config file)
    #[arg(long, value_delimiter = ',')]
    variables: Vec<String>,

    /// Rows used per histogram
    #[arg(long)]
    max_entries: Option<usize>,

    /// Correlate every pair of fitted variables
    #[arg(long)]
    all_pairs: bool,

    /// Append to an existing report instead of replacing it
    #[arg(long)]
    append: bool,

    /// Skip plot export
    #[arg(long)]
    no_plots: bool,

    /// Also write the fit results as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    #[command(flatten)]
    output: OutputFlags,
}

#[derive(clap::Args)]
pub(super) struct FitArgs {
    /// SIMION trajectory table
    input: PathBuf,

    /// Column name or expression such as `atan(vx/vz)`
    variable: String,

    /// Bin count
    #[arg(long)]
    bins: Option<usize>,

    /// Lower histogram edge
    #[arg(long, allow_negative_numbers = true)]
    min: Option<f64>,

    /// Upper histogram edge
    #[arg(long, allow_negative_numbers = true)]
    max: Option<f64>,

    /// JSON analysis configuration
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct CorrelateArgs {
    /// SIMION trajectory table
    input: PathBuf,

    /// Horizontal axis variable
    x: String,

    /// Vertical axis variable
    y: String,

    #[command(flatten)]
    output: OutputFlags,
}

#[derive(clap::Args)]
pub(super) struct EmittanceArgs {
    /// SIMION trajectory table
    input: PathBuf,

    /// Transverse position column (x or y)
    position: String,

    /// Transverse velocity column paired with the position (vx or vy)
    velocity: String,

    #[command(flatten)]
    output: OutputFlags,
}

#[derive(clap::Args)]
pub(super) struct OutputFlags {
    /// JSON analysis configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the report and plots [default: <input dir>/<input stem>]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Plot image format
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
}

impl OutputFlags {
    fn load_config(&self) -> Result<AnalysisConfig, CliError> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(format) = self.format {
            config.plots.format = format.into();
        }
        Ok(config)
    }

    fn prepare_naming(&self, input: &Path) -> Result<ArtifactNaming, CliError> {
        let output_dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| default_output_dir(input));
        ensure_directory(&output_dir)?;
        Ok(ArtifactNaming::for_input(input, output_dir))
    }
}

fn exporter_for(config: &AnalysisConfig) -> PlottersExporter {
    PlottersExporter::new(config.plots.format).with_size(config.plots.width, config.plots.height)
}

fn read_table(input: &Path, config: &AnalysisConfig) -> Result<RecordTable, CliError> {
    Ok(RecordTable::from_path_with_options(input, &config.parse)?)
}

pub(super) fn run_analyze_command(args: AnalyzeArgs) -> Result<i32, CliError> {
    let mut config = args.output.load_config()?;
    if !args.variables.is_empty() {
        config.variables.clone_from(&args.variables);
    }
    if args.max_entries.is_some() {
        config.max_entries = args.max_entries;
    }
    config.all_pairs |= args.all_pairs;
    if args.append {
        config.report_mode = ReportMode::Append;
    }
    if args.no_plots {
        config.plots.enabled = false;
    }
    config.validate()?;

    let table = read_table(&args.input, &config)?;
    let naming = args.output.prepare_naming(&args.input)?;
    let exporter = exporter_for(&config);

    let mut aggregator = ResultsAggregator::new(&config);
    if config.plots.enabled {
        aggregator = aggregator.with_exporter(&exporter, naming.clone());
    }
    let outcome = aggregator.run_pipeline(&table)?;

    let report_path = naming.report();
    ReportWriter::new(config.report_mode)
        .with_title(report_title(&args.input))
        .write(&outcome.results, &report_path)?;

    if let Some(json_path) = &args.json {
        write_results_json(json_path, &outcome.results)?;
        info!(path = %json_path.display(), "fit results written as JSON");
    }

    print_summary(&outcome, &report_path);
    Ok(0)
}

pub(super) fn run_fit_command(args: FitArgs) -> Result<i32, CliError> {
    let mut config = load_config(args.config.as_deref())?;
    let variable = parse_variable(&args.variable)?;

    let configured = config.binning_for(&variable);
    let binning = Binning {
        bins: args.bins.unwrap_or(configured.bins),
        min: args.min.unwrap_or(configured.min),
        max: args.max.unwrap_or(configured.max),
    };
    binning.validate()?;
    config.binning.insert(variable.name().to_string(), binning);

    let table = read_table(&args.input, &config)?;
    let fit = ResultsAggregator::new(&config).run_one(&table, &variable)?;

    let mut results = ResultsTable::new();
    results.insert(fit);
    print!("{}", ReportWriter::default().render(&results));
    Ok(0)
}

pub(super) fn run_correlate_command(args: CorrelateArgs) -> Result<i32, CliError> {
    let config = args.output.load_config()?;
    let x = parse_variable(&args.x)?;
    let y = parse_variable(&args.y)?;

    let table = read_table(&args.input, &config)?;
    let naming = args.output.prepare_naming(&args.input)?;
    let exporter = exporter_for(&config);

    let histogram = ResultsAggregator::new(&config).run_correlation(&table, &x, &y)?;
    let written =
        exporter.export_map(&correlation_plot(&histogram, &naming, exporter.format()))?;
    println!(
        "{} entries ({} out of range, {} undefined) -> {}",
        histogram.entries(),
        histogram.out_of_range(),
        histogram.undefined(),
        written.display()
    );
    Ok(0)
}

pub(super) fn run_emittance_command(args: EmittanceArgs) -> Result<i32, CliError> {
    let config = args.output.load_config()?;
    let position = parse_field(&args.position)?;
    let velocity = parse_field(&args.velocity)?;

    let table = read_table(&args.input, &config)?;
    let naming = args.output.prepare_naming(&args.input)?;
    let exporter = exporter_for(&config);

    let histogram = ResultsAggregator::new(&config).run_emittance(&table, position, velocity)?;
    let written = exporter.export_map(&emittance_plot(
        &histogram,
        position,
        &naming,
        exporter.format(),
    ))?;
    println!(
        "{} entries ({} out of range, {} undefined) -> {}",
        histogram.entries(),
        histogram.out_of_range(),
        histogram.undefined(),
        written.display()
    );
    Ok(0)
}

fn print_summary(outcome: &AnalysisOutcome, report_path: &Path) {
    let unconverged = outcome
        .results
        .iter()
        .filter(|fit| !fit.converged)
        .count();
    println!(
        "Fitted {} variable(s), {} not converged",
        outcome.results.len(),
        unconverged
    );
    println!("Report: {}", report_path.display());
    println!(
        "Plots: {} written, {} failed",
        outcome.plots.len(),
        outcome.export_failures
    );
}
