//! Gaussian peak fitting for 1-D histograms.
//!
//! The model `amplitude * exp(-(x - centroid)^2 / (2 sigma^2))` is fitted to
//! bin count against bin centre by Levenberg-Marquardt, minimising a Neyman
//! chi-square: each bin is weighted by its observed count, `1 / n`. Empty bins
//! carry no weight and are skipped. Neyman weighting pulls amplitude and sigma
//! a few percent low when peak bins hold only a handful of counts, so bin
//! coarsely enough that they hold tens. A fit that cannot converge is returned
//! flagged, never as an error, so one bad variable does not stop a batch.

mod linalg;

pub use linalg::{DenseMatrix, SolveError, solve_dense};

use crate::histogram::Histogram1D;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const PARAMETER_COUNT: usize = 3;
const INITIAL_DAMPING: f64 = 1.0e-3;
const MIN_DAMPING: f64 = 1.0e-12;
const MAX_DAMPING: f64 = 1.0e12;
const CHI_SQUARE_FLOOR: f64 = 1.0e-12;
const QUIET_STEPS_FOR_CONVERGENCE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FitSettings {
    pub max_iterations: usize,
    /// Relative chi-square change (and parameter step) treated as converged.
    pub tolerance: f64,
    /// Initial sigma as a fraction of the histogram range.
    pub initial_sigma_fraction: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1.0e-8,
            initial_sigma_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianParameters {
    pub amplitude: f64,
    pub centroid: f64,
    pub sigma: f64,
}

impl GaussianParameters {
    fn as_array(self) -> [f64; PARAMETER_COUNT] {
        [self.amplitude, self.centroid, self.sigma]
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        gaussian(self.as_array(), x)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitResult {
    pub variable: String,
    pub amplitude: f64,
    pub centroid: f64,
    /// Always non-negative.
    pub sigma: f64,
    pub chi_square: f64,
    pub ndf: usize,
    pub iterations: usize,
    pub converged: bool,
}

impl FitResult {
    pub fn parameters(&self) -> GaussianParameters {
        GaussianParameters {
            amplitude: self.amplitude,
            centroid: self.centroid,
            sigma: self.sigma,
        }
    }

    pub fn reduced_chi_square(&self) -> Option<f64> {
        (self.ndf > 0).then(|| self.chi_square / self.ndf as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FitPoint {
    x: f64,
    y: f64,
    weight: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianFitter {
    settings: FitSettings,
}

impl GaussianFitter {
    pub fn new(settings: FitSettings) -> Self {
        Self { settings }
    }

    /// Starting point: tallest bin for amplitude and centroid, a fixed
    /// fraction of the range for sigma. Empty histograms start at mid-range.
    pub fn initial_guess(&self, histogram: &Histogram1D) -> GaussianParameters {
        let binning = histogram.binning();
        let sigma = self.settings.initial_sigma_fraction * binning.span();
        match histogram.max_bin() {
            Some((bin, count)) => GaussianParameters {
                amplitude: count as f64,
                centroid: histogram.bin_center(bin),
                sigma,
            },
            None => GaussianParameters {
                amplitude: 0.0,
                centroid: binning.min + 0.5 * binning.span(),
                sigma,
            },
        }
    }

    pub fn fit(&self, histogram: &Histogram1D) -> FitResult {
        self.fit_from(histogram, self.initial_guess(histogram))
    }

    pub fn fit_from(&self, histogram: &Histogram1D, initial: GaussianParameters) -> FitResult {
        let variable = histogram.variable().name().to_string();
        let points = collect_points(histogram);

        if points.len() < PARAMETER_COUNT {
            warn!(
                variable = %variable,
                populated_bins = points.len(),
                "too few populated bins for a Gaussian fit"
            );
            return finish(variable, initial.as_array(), f64::NAN, 0, 0, false);
        }

        let ndf = points.len() - PARAMETER_COUNT;
        let outcome = levenberg_marquardt(&points, initial.as_array(), &self.settings);
        let valid = outcome.parameters.iter().all(|value| value.is_finite())
            && outcome.parameters[0] > 0.0
            && outcome.parameters[2] != 0.0
            && outcome.chi_square.is_finite();
        let converged = outcome.converged && valid;

        if converged {
            debug!(
                variable = %variable,
                iterations = outcome.iterations,
                chi_square = outcome.chi_square,
                ndf,
                "Gaussian fit converged"
            );
        } else {
            warn!(
                variable = %variable,
                iterations = outcome.iterations,
                "Gaussian fit did not converge"
            );
        }

        finish(
            variable,
            outcome.parameters,
            outcome.chi_square,
            ndf,
            outcome.iterations,
            converged,
        )
    }
}

fn finish(
    variable: String,
    [amplitude, centroid, sigma]: [f64; PARAMETER_COUNT],
    chi_square: f64,
    ndf: usize,
    iterations: usize,
    converged: bool,
) -> FitResult {
    FitResult {
        variable,
        amplitude,
        centroid,
        sigma: sigma.abs(),
        chi_square,
        ndf,
        iterations,
        converged,
    }
}

fn collect_points(histogram: &Histogram1D) -> Vec<FitPoint> {
    histogram
        .counts()
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(bin, count)| {
            let y = *count as f64;
            FitPoint {
                x: histogram.bin_center(bin),
                y,
                weight: 1.0 / y,
            }
        })
        .collect()
}

fn gaussian([amplitude, centroid, sigma]: [f64; PARAMETER_COUNT], x: f64) -> f64 {
    let offset = x - centroid;
    amplitude * (-(offset * offset) / (2.0 * sigma * sigma)).exp()
}

fn gradient(
    [amplitude, centroid, sigma]: [f64; PARAMETER_COUNT],
    x: f64,
) -> [f64; PARAMETER_COUNT] {
    let offset = x - centroid;
    let sigma_sq = sigma * sigma;
    let shape = (-(offset * offset) / (2.0 * sigma_sq)).exp();
    [
        shape,
        amplitude * shape * offset / sigma_sq,
        amplitude * shape * offset * offset / (sigma_sq * sigma),
    ]
}

fn chi_square(points: &[FitPoint], parameters: [f64; PARAMETER_COUNT]) -> f64 {
    points
        .iter()
        .map(|point| {
            let residual = point.y - gaussian(parameters, point.x);
            point.weight * residual * residual
        })
        .sum()
}

fn normal_equations(
    points: &[FitPoint],
    parameters: [f64; PARAMETER_COUNT],
) -> (DenseMatrix, [f64; PARAMETER_COUNT]) {
    let mut curvature = DenseMatrix::zeros(PARAMETER_COUNT, PARAMETER_COUNT);
    let mut slope = [0.0; PARAMETER_COUNT];

    for point in points {
        let derivatives = gradient(parameters, point.x);
        let residual = point.y - gaussian(parameters, point.x);
        for row in 0..PARAMETER_COUNT {
            slope[row] += point.weight * residual * derivatives[row];
            for col in 0..=row {
                let updated =
                    curvature[(row, col)] + point.weight * derivatives[row] * derivatives[col];
                curvature[(row, col)] = updated;
            }
        }
    }

    for row in 0..PARAMETER_COUNT {
        for col in (row + 1)..PARAMETER_COUNT {
            curvature[(row, col)] = curvature[(col, row)];
        }
    }

    (curvature, slope)
}

struct SolverOutcome {
    parameters: [f64; PARAMETER_COUNT],
    chi_square: f64,
    iterations: usize,
    converged: bool,
}

fn levenberg_marquardt(
    points: &[FitPoint],
    initial: [f64; PARAMETER_COUNT],
    settings: &FitSettings,
) -> SolverOutcome {
    let mut parameters = initial;
    let mut current = chi_square(points, parameters);
    let mut damping = INITIAL_DAMPING;
    let mut quiet_steps = 0;
    let mut iterations = 0;
    let mut converged = false;

    if !current.is_finite() {
        return SolverOutcome {
            parameters,
            chi_square: current,
            iterations,
            converged,
        };
    }

    while iterations < settings.max_iterations {
        iterations += 1;

        let (curvature, slope) = normal_equations(points, parameters);
        let mut damped = curvature.clone();
        for diagonal in 0..PARAMETER_COUNT {
            damped[(diagonal, diagonal)] = curvature[(diagonal, diagonal)] * (1.0 + damping);
        }

        let step = match solve_dense(&damped, &slope) {
            Ok(step) => step,
            Err(_) => {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    break;
                }
                continue;
            }
        };

        let mut trial = parameters;
        for (value, delta) in trial.iter_mut().zip(&step) {
            *value += delta;
        }
        let candidate = chi_square(points, trial);

        if candidate.is_finite() && candidate <= current {
            let improvement = current - candidate;
            let small_step = step.iter().zip(&parameters).all(|(delta, value)| {
                delta.abs() <= settings.tolerance * (value.abs() + settings.tolerance)
            });

            parameters = trial;
            current = candidate;
            damping = (damping / 10.0).max(MIN_DAMPING);

            if improvement <= settings.tolerance * current + CHI_SQUARE_FLOOR || small_step {
                quiet_steps += 1;
                if quiet_steps >= QUIET_STEPS_FOR_CONVERGENCE {
                    converged = true;
                    break;
                }
            } else {
                quiet_steps = 0;
            }
        } else {
            damping *= 10.0;
            if damping > MAX_DAMPING {
                break;
            }
        }
    }

    SolverOutcome {
        parameters,
        chi_square: current,
        iterations,
        converged,
    }
}
