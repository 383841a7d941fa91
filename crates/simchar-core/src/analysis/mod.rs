//! Batch orchestration: histogram, fit and export every requested variable.

mod naming;

pub use naming::ArtifactNaming;

use crate::config::AnalysisConfig;
use crate::domain::{AnalysisResult, Field, Variable};
use crate::fitting::{FitResult, GaussianFitter};
use crate::histogram::{Histogram1D, Histogram2D, build_1d, build_2d};
use crate::plotting::{FitPlot, MapPlot, MapStyle, PlotExporter, PlotFormat};
use crate::records::RecordTable;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Fit results keyed by variable name, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultsTable {
    entries: Vec<FitResult>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repeated variable replaces the earlier result but keeps its position.
    pub fn insert(&mut self, result: FitResult) {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.variable == result.variable)
        {
            Some(existing) => *existing = result,
            None => self.entries.push(result),
        }
    }

    pub fn get(&self, variable: &str) -> Option<&FitResult> {
        self.entries.iter().find(|entry| entry.variable == variable)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FitResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub results: ResultsTable,
    pub correlations: Vec<Histogram2D>,
    pub emittances: Vec<Histogram2D>,
    pub plots: Vec<PathBuf>,
    pub export_failures: usize,
}

#[derive(Debug, Default)]
struct ExportLog {
    written: Vec<PathBuf>,
    failures: usize,
}

impl ExportLog {
    fn record(&mut self, outcome: AnalysisResult<PathBuf>) {
        match outcome {
            Ok(path) => self.written.push(path),
            Err(error) => {
                warn!(error = %error, "plot export failed; continuing");
                self.failures += 1;
            }
        }
    }
}

/// Every unordered pair `(variables[i], variables[j])` with `i < j`.
pub fn correlation_pairs(variables: &[Variable]) -> Vec<(Variable, Variable)> {
    variables
        .iter()
        .enumerate()
        .flat_map(|(i, x)| variables[i + 1..].iter().map(move |y| (x.clone(), y.clone())))
        .collect()
}

/// Fit plot for `histogram`; the curve is drawn only for a converged fit.
pub fn fit_plot<'h>(
    histogram: &'h Histogram1D,
    fit: &'h FitResult,
    naming: &ArtifactNaming,
    format: PlotFormat,
) -> FitPlot<'h> {
    let variable = histogram.variable();
    FitPlot {
        histogram,
        fit: fit.converged.then_some(fit),
        title: format!("{variable} Gaussian fit"),
        x_label: variable.axis_label(),
        output_path: naming.fit_plot(variable, format),
    }
}

pub fn correlation_plot<'h>(
    histogram: &'h Histogram2D,
    naming: &ArtifactNaming,
    format: PlotFormat,
) -> MapPlot<'h> {
    let (x, y) = histogram.axes();
    MapPlot {
        histogram,
        style: MapStyle::ColorMap,
        title: format!("{y} vs {x}"),
        x_label: x.axis_label(),
        y_label: y.axis_label(),
        output_path: naming.correlation_plot(x, y, format),
    }
}

pub fn emittance_plot<'h>(
    histogram: &'h Histogram2D,
    position: Field,
    naming: &ArtifactNaming,
    format: PlotFormat,
) -> MapPlot<'h> {
    let (x, y) = histogram.axes();
    MapPlot {
        histogram,
        style: MapStyle::Scatter,
        title: format!("{position} emittance"),
        x_label: x.axis_label(),
        y_label: y.axis_label(),
        output_path: naming.emittance_plot(position, format),
    }
}

pub struct ResultsAggregator<'a> {
    config: &'a AnalysisConfig,
    fitter: GaussianFitter,
    export: Option<(&'a dyn PlotExporter, ArtifactNaming)>,
}

impl<'a> ResultsAggregator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self {
            config,
            fitter: GaussianFitter::new(config.fit),
            export: None,
        }
    }

    pub fn with_exporter(mut self, exporter: &'a dyn PlotExporter, naming: ArtifactNaming) -> Self {
        self.export = Some((exporter, naming));
        self
    }

    /// Fits each variable in order. Unusable variables or binning abort the
    /// batch; a fit that fails to converge is recorded and the batch goes on.
    pub fn run_all(
        &self,
        table: &RecordTable,
        variables: &[Variable],
    ) -> AnalysisResult<ResultsTable> {
        self.fit_variables(table, variables, &mut ExportLog::default())
    }

    /// Builds (and exports) one fit without touching a results table.
    pub fn run_one(&self, table: &RecordTable, variable: &Variable) -> AnalysisResult<FitResult> {
        let (_, fit) = self.fit_variable(table, variable, &mut ExportLog::default())?;
        Ok(fit)
    }

    pub fn run_correlation(
        &self,
        table: &RecordTable,
        x: &Variable,
        y: &Variable,
    ) -> AnalysisResult<Histogram2D> {
        self.correlate(table, x, y, &mut ExportLog::default())
    }

    pub fn run_emittance(
        &self,
        table: &RecordTable,
        position: Field,
        velocity: Field,
    ) -> AnalysisResult<Histogram2D> {
        self.emittance(table, position, velocity, &mut ExportLog::default())
    }

    /// The configured batch: fits, correlation maps, then emittance maps.
    pub fn run_pipeline(&self, table: &RecordTable) -> AnalysisResult<AnalysisOutcome> {
        self.config.validate()?;
        let variables = self.config.resolve_variables()?;
        let pairs = if self.config.all_pairs {
            correlation_pairs(&variables)
        } else {
            self.config.resolve_correlations()?
        };
        let emittance_axes = self.config.resolve_emittance()?;

        info!(
            rows = table.len(),
            variables = variables.len(),
            correlations = pairs.len(),
            emittances = emittance_axes.len(),
            "starting analysis"
        );

        let mut log = ExportLog::default();
        let results = self.fit_variables(table, &variables, &mut log)?;
        let correlations = pairs
            .iter()
            .map(|(x, y)| self.correlate(table, x, y, &mut log))
            .collect::<AnalysisResult<Vec<_>>>()?;
        let emittances = emittance_axes
            .iter()
            .map(|(position, velocity)| self.emittance(table, *position, *velocity, &mut log))
            .collect::<AnalysisResult<Vec<_>>>()?;

        info!(
            fits = results.len(),
            plots = log.written.len(),
            export_failures = log.failures,
            "analysis finished"
        );

        Ok(AnalysisOutcome {
            results,
            correlations,
            emittances,
            plots: log.written,
            export_failures: log.failures,
        })
    }

    fn sample(&self, table: &RecordTable, variable: &Variable) -> Vec<f64> {
        let mut values = table.values(variable);
        if let Some(limit) = self.config.max_entries {
            values.truncate(limit);
        }
        values
    }

    fn fit_variables(
        &self,
        table: &RecordTable,
        variables: &[Variable],
        log: &mut ExportLog,
    ) -> AnalysisResult<ResultsTable> {
        let mut results = ResultsTable::new();
        for variable in variables {
            let (_, fit) = self.fit_variable(table, variable, log)?;
            results.insert(fit);
        }
        Ok(results)
    }

    fn fit_variable(
        &self,
        table: &RecordTable,
        variable: &Variable,
        log: &mut ExportLog,
    ) -> AnalysisResult<(Histogram1D, FitResult)> {
        let values = self.sample(table, variable);
        let histogram = build_1d(variable.clone(), &values, self.config.binning_for(variable))?;
        debug!(
            variable = %variable,
            entries = histogram.entries(),
            dropped = histogram.dropped(),
            "histogram built"
        );

        let fit = self.fitter.fit(&histogram);
        if let Some((exporter, naming)) = &self.export {
            let plot = fit_plot(&histogram, &fit, naming, exporter.format());
            log.record(exporter.export_fit(&plot));
        }
        Ok((histogram, fit))
    }

    fn correlate(
        &self,
        table: &RecordTable,
        x: &Variable,
        y: &Variable,
        log: &mut ExportLog,
    ) -> AnalysisResult<Histogram2D> {
        let xs = self.sample(table, x);
        let ys = self.sample(table, y);
        let histogram = build_2d(
            x.clone(),
            y.clone(),
            &xs,
            &ys,
            self.config.binning_for(x),
            self.config.binning_for(y),
        )?;
        debug!(id = %histogram.id(), entries = histogram.entries(), "correlation built");

        if let Some((exporter, naming)) = &self.export {
            let plot = correlation_plot(&histogram, naming, exporter.format());
            log.record(exporter.export_map(&plot));
        }
        Ok(histogram)
    }

    fn emittance(
        &self,
        table: &RecordTable,
        position: Field,
        velocity: Field,
        log: &mut ExportLog,
    ) -> AnalysisResult<Histogram2D> {
        let position_variable = Variable::Field(position);
        let angle = Variable::divergence_angle(position, velocity);
        let positions = self.sample(table, &position_variable);
        let angles = self.sample(table, &angle);
        let histogram = build_2d(
            position_variable.clone(),
            angle.clone(),
            &positions,
            &angles,
            self.config.binning_for(&position_variable),
            self.config.binning_for(&angle),
        )?;
        debug!(
            id = %histogram.id(),
            entries = histogram.entries(),
            undefined = histogram.undefined(),
            "emittance built"
        );

        if let Some((exporter, naming)) = &self.export {
            let plot = emittance_plot(&histogram, position, naming, exporter.format());
            log.record(exporter.export_map(&plot));
        }
        Ok(histogram)
    }
}

#[cfg(test)]
mod tests {
    use super::{ArtifactNaming, ResultsAggregator, ResultsTable, correlation_pairs};
    use crate::config::AnalysisConfig;
    use crate::domain::{AnalysisError, AnalysisResult, Field, Variable};
    use crate::fitting::FitResult;
    use crate::histogram::Binning;
    use crate::plotting::{FitPlot, MapPlot, MapStyle, PlotExporter, PlotFormat};
    use crate::records::{Record, RecordTable};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    #[derive(Default)]
    struct RecordingExporter {
        fits: RefCell<Vec<(PathBuf, bool)>>,
        maps: RefCell<Vec<(PathBuf, MapStyle)>>,
        fail: bool,
    }

    impl RecordingExporter {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn outcome(&self, path: &Path) -> AnalysisResult<PathBuf> {
            if self.fail {
                return Err(AnalysisError::PlotExport {
                    path: path.to_path_buf(),
                    message: "backend unavailable".to_string(),
                });
            }
            Ok(path.to_path_buf())
        }
    }

    impl PlotExporter for RecordingExporter {
        fn format(&self) -> PlotFormat {
            PlotFormat::Svg
        }

        fn export_fit(&self, plot: &FitPlot<'_>) -> AnalysisResult<PathBuf> {
            self.fits
                .borrow_mut()
                .push((plot.output_path.clone(), plot.fit.is_some()));
            self.outcome(&plot.output_path)
        }

        fn export_map(&self, plot: &MapPlot<'_>) -> AnalysisResult<PathBuf> {
            self.maps
                .borrow_mut()
                .push((plot.output_path.clone(), plot.style));
            self.outcome(&plot.output_path)
        }
    }

    fn record(index: u32, x: f32, vx: f32, vz: f32) -> Record {
        Record {
            index,
            time_of_flight: 10.0,
            x,
            y: 0.0,
            z: 0.0,
            vx,
            vy: 0.0,
            vz,
            kinetic_energy: 100.0,
        }
    }

    /// Beam centred on the axis: `x ~ N(0, 1.5)` mm, `vx ~ N(0, 0.2)` mm/us and
    /// `vz = 10` mm/us. `z` is a constant 0 and cannot be fitted.
    fn gaussian_table(rows: usize) -> RecordTable {
        let mut rng = StdRng::seed_from_u64(17);
        let position = Normal::new(0.0_f32, 1.5).expect("normal distribution should build");
        let velocity = Normal::new(0.0_f32, 0.2).expect("normal distribution should build");
        RecordTable::from_records(
            (0..rows)
                .map(|index| {
                    record(
                        index as u32,
                        position.sample(&mut rng),
                        velocity.sample(&mut rng),
                        10.0,
                    )
                })
                .collect(),
        )
    }

    fn fit_named(variable: &str, amplitude: f64) -> FitResult {
        FitResult {
            variable: variable.to_string(),
            amplitude,
            centroid: 0.0,
            sigma: 1.0,
            chi_square: 0.0,
            ndf: 1,
            iterations: 1,
            converged: true,
        }
    }

    #[test]
    fn results_table_keeps_first_position_and_last_value() {
        let mut table = ResultsTable::new();
        table.insert(fit_named("x", 1.0));
        table.insert(fit_named("vx", 2.0));
        table.insert(fit_named("x", 3.0));

        let names = table.iter().map(|fit| fit.variable.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["x", "vx"]);
        assert_eq!(table.get("x").map(|fit| fit.amplitude), Some(3.0));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn degenerate_variable_is_flagged_while_others_fit() {
        let config = AnalysisConfig::default();
        let table = gaussian_table(20_000);
        let variables = [Variable::Field(Field::X), Variable::Field(Field::Z)];

        let results = ResultsAggregator::new(&config)
            .run_all(&table, &variables)
            .expect("batch should run");

        assert_eq!(results.len(), 2);
        let x = results.get("x").expect("x should be fitted");
        assert!(x.converged, "{x:?}");
        assert!(x.centroid.abs() < 0.1, "{x:?}");
        assert!((x.sigma - 1.5).abs() < 0.15, "{x:?}");

        let z = results.get("z").expect("z should be recorded");
        assert!(!z.converged);
    }

    #[test]
    fn default_ranges_keep_negative_transverse_values() {
        let config = AnalysisConfig::default();
        let table = gaussian_table(20_000);
        let aggregator = ResultsAggregator::new(&config);

        let results = aggregator
            .run_all(&table, &[Variable::Field(Field::X), Variable::Field(Field::Vx)])
            .expect("batch should run");
        let x = results.get("x").expect("x should be fitted");
        assert!(x.converged, "{x:?}");
        assert!((x.sigma - 1.5).abs() < 0.15, "{x:?}");
        let vx = results.get("vx").expect("vx should be fitted");
        assert!(vx.converged, "{vx:?}");
        assert!(vx.centroid.abs() < 0.02, "{vx:?}");
        assert!((vx.sigma - 0.2).abs() < 0.02, "{vx:?}");

        let emittance = aggregator
            .run_emittance(&table, Field::X, Field::Vx)
            .expect("emittance should build");
        assert_eq!(emittance.entries(), 20_000);
        assert_eq!(emittance.out_of_range(), 0);
    }

    #[test]
    fn max_entries_caps_the_sample() {
        let config = AnalysisConfig {
            max_entries: Some(500),
            ..AnalysisConfig::default()
        };
        let table = gaussian_table(2_000);
        let histogram = ResultsAggregator::new(&config)
            .run_correlation(&table, &Variable::Field(Field::X), &Variable::Field(Field::Z))
            .expect("correlation should build");

        assert_eq!(histogram.entries() + histogram.out_of_range() + histogram.undefined(), 500);
    }

    #[test]
    fn unknown_variable_aborts_the_batch() {
        let config = AnalysisConfig {
            variables: vec!["x".to_string(), "energy".to_string()],
            ..AnalysisConfig::default()
        };
        let error = ResultsAggregator::new(&config)
            .run_pipeline(&gaussian_table(10))
            .expect_err("unknown variable should abort");
        assert!(matches!(error, AnalysisError::UnknownVariable { .. }));
    }

    #[test]
    fn emittance_excludes_rows_with_zero_longitudinal_velocity() {
        let mut config = AnalysisConfig::default();
        config.binning.insert(
            "x".to_string(),
            Binning {
                bins: 20,
                min: -10.0,
                max: 10.0,
            },
        );
        let table = RecordTable::from_records(vec![
            record(1, 1.0, 1.0, 10.0),
            record(2, 2.0, 1.0, 0.0),
            record(3, 3.0, 1.0, 20.0),
        ]);

        let histogram = ResultsAggregator::new(&config)
            .run_emittance(&table, Field::X, Field::Vx)
            .expect("emittance should build");

        assert_eq!(histogram.entries(), 2);
        assert_eq!(histogram.undefined(), 1);
        assert_eq!(histogram.id().to_string(), "x':x");
    }

    #[test]
    fn pipeline_exports_every_artifact_with_expected_names() {
        let config = AnalysisConfig {
            variables: vec!["x".to_string(), "z".to_string()],
            ..AnalysisConfig::default()
        };
        let exporter = RecordingExporter::default();
        let outcome = ResultsAggregator::new(&config)
            .with_exporter(&exporter, ArtifactNaming::new("out", "run"))
            .run_pipeline(&gaussian_table(5_000))
            .expect("pipeline should run");

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.correlations.len(), 1);
        assert_eq!(outcome.emittances.len(), 2);
        assert_eq!(outcome.plots.len(), 5);
        assert_eq!(outcome.export_failures, 0);

        let fits = exporter.fits.borrow();
        assert_eq!(
            fits.as_slice(),
            [
                (PathBuf::from("out/run_x_fit_gaus.svg"), true),
                (PathBuf::from("out/run_z_fit_gaus.svg"), false),
            ]
        );
        let maps = exporter.maps.borrow();
        assert_eq!(
            maps.as_slice(),
            [
                (PathBuf::from("out/run_x_vs_vx.svg"), MapStyle::ColorMap),
                (PathBuf::from("out/run_xemittance.svg"), MapStyle::Scatter),
                (PathBuf::from("out/run_yemittance.svg"), MapStyle::Scatter),
            ]
        );
    }

    #[test]
    fn export_failures_are_counted_not_raised() {
        let config = AnalysisConfig {
            variables: vec!["x".to_string()],
            emittance: Vec::new(),
            ..AnalysisConfig::default()
        };
        let exporter = RecordingExporter::failing();
        let outcome = ResultsAggregator::new(&config)
            .with_exporter(&exporter, ArtifactNaming::new("out", "run"))
            .run_pipeline(&gaussian_table(1_000))
            .expect("pipeline should survive export failures");

        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.plots.is_empty());
        assert_eq!(outcome.export_failures, 2);
    }

    #[test]
    fn all_pairs_covers_every_unordered_pair_including_the_last_variable() {
        let variables = ["x", "y", "vx", "vy"]
            .iter()
            .map(|name| Variable::parse(name).expect("field should resolve"))
            .collect::<Vec<_>>();
        let pairs = correlation_pairs(&variables);

        assert_eq!(pairs.len(), 6);
        assert_eq!(pairs[0], (Variable::Field(Field::X), Variable::Field(Field::Y)));
        assert_eq!(pairs[5], (Variable::Field(Field::Vx), Variable::Field(Field::Vy)));
        assert!(correlation_pairs(&variables[..1]).is_empty());
    }
}
