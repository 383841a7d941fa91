mod render;

pub use render::PlottersExporter;

use crate::domain::AnalysisResult;
use crate::fitting::FitResult;
use crate::histogram::{Histogram1D, Histogram2D};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotFormat {
    #[default]
    Svg,
    Png,
}

impl PlotFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapStyle {
    /// Filled cells shaded by count, for correlation plots.
    ColorMap,
    /// One marker per populated cell, for emittance plots.
    Scatter,
}

/// A 1-D histogram with an optional fitted curve on top.
#[derive(Debug, Clone)]
pub struct FitPlot<'a> {
    pub histogram: &'a Histogram1D,
    pub fit: Option<&'a FitResult>,
    pub title: String,
    pub x_label: String,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MapPlot<'a> {
    pub histogram: &'a Histogram2D,
    pub style: MapStyle,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub output_path: PathBuf,
}

/// Renders finished histograms to image files and returns the written path.
pub trait PlotExporter {
    fn format(&self) -> PlotFormat;

    fn export_fit(&self, plot: &FitPlot<'_>) -> AnalysisResult<PathBuf>;

    fn export_map(&self, plot: &MapPlot<'_>) -> AnalysisResult<PathBuf>;
}
