//! Fixed-width text summary of fitted peaks.

use crate::analysis::ResultsTable;
use crate::domain::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

const MIN_NAME_WIDTH: usize = 12;
const NAME_GAP: usize = 2;
const VALUE_WIDTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    #[default]
    Overwrite,
    Append,
}

#[derive(Debug, Clone, Default)]
pub struct ReportWriter {
    mode: ReportMode,
    title: Option<String>,
}

impl ReportWriter {
    pub fn new(mode: ReportMode) -> Self {
        Self { mode, title: None }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// The name column grows to fit the longest label so values stay aligned.
    pub fn render(&self, results: &ResultsTable) -> String {
        let name_width = results
            .iter()
            .map(|fit| fit.variable.chars().count() + NAME_GAP)
            .fold(MIN_NAME_WIDTH, usize::max);
        let separator = "-".repeat(name_width + 3 * VALUE_WIDTH);
        let mut rendered = String::new();

        if let Some(title) = &self.title {
            let _ = writeln!(rendered, "{title}");
            rendered.push('\n');
        }

        let _ = writeln!(
            rendered,
            "{:<name_width$}{:>VALUE_WIDTH$}{:>VALUE_WIDTH$}{:>VALUE_WIDTH$}",
            "Variable", "Peak maximum", "Centroid", "Sigma"
        );
        let _ = writeln!(rendered, "{separator}");

        for fit in results.iter() {
            let _ = write!(
                rendered,
                "{:<name_width$}{:>VALUE_WIDTH$.6}{:>VALUE_WIDTH$.6}{:>VALUE_WIDTH$.6}",
                fit.variable, fit.amplitude, fit.centroid, fit.sigma
            );
            if !fit.converged {
                rendered.push_str("  converged=false");
            }
            rendered.push('\n');
        }

        let _ = writeln!(rendered, "{separator}");
        rendered.push('\n');
        rendered
    }

    /// Writes the rendered table, truncating or appending per the mode.
    pub fn write(&self, results: &ResultsTable, destination: &Path) -> AnalysisResult<()> {
        let file = match self.mode {
            ReportMode::Overwrite => File::create(destination),
            ReportMode::Append => OpenOptions::new()
                .create(true)
                .append(true)
                .open(destination),
        }
        .map_err(|source| write_error(destination, source))?;

        let mut writer = BufWriter::new(file);
        writer
            .write_all(self.render(results).as_bytes())
            .map_err(|source| write_error(destination, source))?;
        writer
            .flush()
            .map_err(|source| write_error(destination, source))?;

        info!(
            path = %destination.display(),
            rows = results.len(),
            mode = ?self.mode,
            "report written"
        );
        Ok(())
    }
}

fn write_error(path: &Path, source: std::io::Error) -> AnalysisError {
    AnalysisError::ReportWrite {
        path: path.to_path_buf(),
        source,
    }
}
