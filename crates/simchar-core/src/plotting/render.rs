use super::{FitPlot, MapPlot, MapStyle, PlotExporter, PlotFormat};
use crate::domain::{AnalysisError, AnalysisResult};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::debug;

type DrawResult = Result<(), Box<dyn Error + Send + Sync>>;

const DEFAULT_SIZE: (u32, u32) = (1024, 720);
const CURVE_SAMPLES: usize = 400;
const HISTOGRAM_FILL: RGBColor = RGBColor(70, 130, 180);
const FIT_CURVE: RGBColor = RGBColor(200, 30, 30);
const SCATTER_MARKER: RGBColor = RGBColor(30, 110, 200);
const HEAT_LOW: (f64, f64, f64) = (255.0, 237.0, 160.0);
const HEAT_HIGH: (f64, f64, f64) = (189.0, 0.0, 38.0);

/// `plotters`-backed exporter writing SVG or PNG files.
#[derive(Debug, Clone, Copy)]
pub struct PlottersExporter {
    format: PlotFormat,
    size: (u32, u32),
}

impl PlottersExporter {
    pub fn new(format: PlotFormat) -> Self {
        Self {
            format,
            size: DEFAULT_SIZE,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }
}

impl PlotExporter for PlottersExporter {
    fn format(&self) -> PlotFormat {
        self.format
    }

    fn export_fit(&self, plot: &FitPlot<'_>) -> AnalysisResult<PathBuf> {
        let path = plot.output_path.as_path();
        let drawn = match self.format {
            PlotFormat::Svg => draw_fit(SVGBackend::new(path, self.size).into_drawing_area(), plot),
            PlotFormat::Png => {
                draw_fit(BitMapBackend::new(path, self.size).into_drawing_area(), plot)
            }
        };
        drawn.map_err(|error| export_error(path, error))?;
        debug!(path = %path.display(), "fit plot written");
        Ok(plot.output_path.clone())
    }

    fn export_map(&self, plot: &MapPlot<'_>) -> AnalysisResult<PathBuf> {
        let path = plot.output_path.as_path();
        let drawn = match self.format {
            PlotFormat::Svg => draw_map(SVGBackend::new(path, self.size).into_drawing_area(), plot),
            PlotFormat::Png => {
                draw_map(BitMapBackend::new(path, self.size).into_drawing_area(), plot)
            }
        };
        drawn.map_err(|error| export_error(path, error))?;
        debug!(path = %path.display(), "map plot written");
        Ok(plot.output_path.clone())
    }
}

fn export_error(path: &Path, error: Box<dyn Error + Send + Sync>) -> AnalysisError {
    AnalysisError::PlotExport {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

fn draw_fit<DB>(root: DrawingArea<DB, Shift>, plot: &FitPlot<'_>) -> DrawResult
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let histogram = plot.histogram;
    let binning = histogram.binning();
    let tallest = histogram.max_bin().map_or(0.0, |(_, count)| count as f64);
    let fitted_peak = plot
        .fit
        .map(|fit| fit.amplitude)
        .filter(|amplitude| amplitude.is_finite())
        .unwrap_or(0.0);
    let y_max = (tallest.max(fitted_peak) * 1.1).max(1.0);

    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(plot.title.as_str(), ("sans-serif", 22))
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .build_cartesian_2d(binning.min..binning.max, 0.0..y_max)?;

    chart
        .configure_mesh()
        .x_desc(plot.x_label.as_str())
        .y_desc("Counts")
        .draw()?;

    chart.draw_series(
        histogram
            .counts()
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(bin, count)| {
                Rectangle::new(
                    [
                        (binning.lower_edge(bin), 0.0),
                        (binning.lower_edge(bin + 1), *count as f64),
                    ],
                    HISTOGRAM_FILL.filled(),
                )
            }),
    )?;

    if let Some(fit) = plot.fit {
        let parameters = fit.parameters();
        let curve = (0..=CURVE_SAMPLES).map(|sample| {
            let x = binning.min + binning.span() * sample as f64 / CURVE_SAMPLES as f64;
            (x, parameters.evaluate(x).min(y_max))
        });
        chart.draw_series(LineSeries::new(curve, FIT_CURVE.stroke_width(2)))?;
    }

    root.present()?;
    Ok(())
}

fn draw_map<DB>(root: DrawingArea<DB, Shift>, plot: &MapPlot<'_>) -> DrawResult
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let histogram = plot.histogram;
    let x_binning = histogram.x_binning();
    let y_binning = histogram.y_binning();
    let peak = histogram.max_count().max(1) as f64;

    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(plot.title.as_str(), ("sans-serif", 22))
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(70)
        .build_cartesian_2d(x_binning.min..x_binning.max, y_binning.min..y_binning.max)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(plot.x_label.as_str())
        .y_desc(plot.y_label.as_str())
        .draw()?;

    match plot.style {
        MapStyle::ColorMap => {
            chart.draw_series(histogram.cells().map(|(x_bin, y_bin, count)| {
                Rectangle::new(
                    [
                        (x_binning.lower_edge(x_bin), y_binning.lower_edge(y_bin)),
                        (
                            x_binning.lower_edge(x_bin + 1),
                            y_binning.lower_edge(y_bin + 1),
                        ),
                    ],
                    heat_color(count as f64 / peak).filled(),
                )
            }))?;
        }
        MapStyle::Scatter => {
            chart.draw_series(histogram.cells().map(|(x_bin, y_bin, _)| {
                Circle::new(
                    (x_binning.center(x_bin), y_binning.center(y_bin)),
                    2,
                    SCATTER_MARKER.filled(),
                )
            }))?;
        }
    }

    root.present()?;
    Ok(())
}

fn heat_color(fraction: f64) -> RGBColor {
    let t = fraction.clamp(0.0, 1.0);
    let channel = |low: f64, high: f64| (low + (high - low) * t).round() as u8;
    RGBColor(
        channel(HEAT_LOW.0, HEAT_HIGH.0),
        channel(HEAT_LOW.1, HEAT_HIGH.1),
        channel(HEAT_LOW.2, HEAT_HIGH.2),
    )
}
