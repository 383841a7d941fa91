use super::CliError;
use anyhow::Context;
use simchar_core::analysis::ResultsTable;
use simchar_core::config::{AnalysisConfig, load_analysis_config};
use simchar_core::domain::{AnalysisError, Field, Variable};
use simchar_core::plotting::PlotFormat;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(super) enum FormatArg {
    Svg,
    Png,
}

impl From<FormatArg> for PlotFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Svg => PlotFormat::Svg,
            FormatArg::Png => PlotFormat::Png,
        }
    }
}

pub(super) fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

pub(super) fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, CliError> {
    match path {
        Some(path) => {
            let config = load_analysis_config(path)?;
            debug!(path = %path.display(), "analysis config loaded");
            Ok(config)
        }
        None => Ok(AnalysisConfig::default()),
    }
}

/// `<input dir>/<input stem>`, the per-run folder next to the input.
pub(super) fn default_output_dir(input: &Path) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    match input.file_stem() {
        Some(stem) => parent.join(stem),
        None => parent.join("simchar-output"),
    }
}

pub(super) fn ensure_directory(path: &Path) -> Result<(), CliError> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create output directory '{}'", path.display()))?;
    Ok(())
}

pub(super) fn report_title(input: &Path) -> String {
    let unix_seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    format!("{} (unix time {unix_seconds})", input.display())
}

pub(super) fn write_results_json(path: &Path, results: &ResultsTable) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(results).context("failed to serialize fit results")?;
    fs::write(path, rendered + "\n")
        .with_context(|| format!("failed to write fit results '{}'", path.display()))?;
    Ok(())
}

pub(super) fn parse_variable(name: &str) -> Result<Variable, CliError> {
    Ok(Variable::parse(name)?)
}

pub(super) fn parse_field(name: &str) -> Result<Field, CliError> {
    Field::from_name(name)
        .ok_or_else(|| CliError::Analysis(AnalysisError::unknown_variable(name)))
}
