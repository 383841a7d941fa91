//! Fixed-binning count histograms.
//!
//! Bins cover the half-open range `[min, max)`. Values outside it are counted
//! as underflow/overflow and never clipped into the edge bins; `NaN` values
//! are counted as undefined. Histograms are immutable once built.

use crate::domain::{AnalysisError, AnalysisResult, HistogramId, Variable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Binning {
    pub bins: usize,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinSlot {
    Bin(usize),
    Underflow,
    Overflow,
    Undefined,
}

impl Binning {
    pub fn new(bins: usize, min: f64, max: f64) -> AnalysisResult<Self> {
        let binning = Self { bins, min, max };
        binning.validate()?;
        Ok(binning)
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if self.bins == 0 {
            return Err(AnalysisError::invalid_binning(
                "bin count must be a positive integer",
            ));
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(AnalysisError::invalid_binning(format!(
                "range bounds must be finite, got [{}, {})",
                self.min, self.max
            )));
        }
        if self.min >= self.max {
            return Err(AnalysisError::invalid_binning(format!(
                "range lower bound {} must be below upper bound {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        (self.max - self.min) / self.bins as f64
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn lower_edge(&self, bin: usize) -> f64 {
        self.min + bin as f64 * self.width()
    }

    pub fn center(&self, bin: usize) -> f64 {
        self.min + (bin as f64 + 0.5) * self.width()
    }

    pub fn slot(&self, value: f64) -> BinSlot {
        if value.is_nan() {
            return BinSlot::Undefined;
        }
        if value < self.min {
            return BinSlot::Underflow;
        }
        if value >= self.max {
            return BinSlot::Overflow;
        }

        let bin = ((value - self.min) / self.width()) as usize;
        // Rounding can push values just below `max` onto `bins`.
        BinSlot::Bin(bin.min(self.bins - 1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    id: HistogramId,
    binning: Binning,
    counts: Vec<u64>,
    underflow: u64,
    overflow: u64,
    undefined: u64,
}

impl Histogram1D {
    pub fn id(&self) -> &HistogramId {
        &self.id
    }

    pub fn variable(&self) -> &Variable {
        match &self.id {
            HistogramId::OneD(variable) => variable,
            HistogramId::TwoD { x, .. } => x,
        }
    }

    pub fn binning(&self) -> Binning {
        self.binning
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn underflow(&self) -> u64 {
        self.underflow
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    pub fn undefined(&self) -> u64 {
        self.undefined
    }

    /// Values that landed in a bin.
    pub fn entries(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn dropped(&self) -> u64 {
        self.underflow + self.overflow + self.undefined
    }

    /// Every value offered to the histogram, binned or not.
    pub fn total_count(&self) -> u64 {
        self.entries() + self.dropped()
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.binning.center(bin)
    }

    /// `bins + 1` edges from `min` to `max`.
    pub fn bin_edges(&self) -> Vec<f64> {
        (0..=self.binning.bins)
            .map(|edge| self.binning.lower_edge(edge))
            .collect()
    }

    /// First bin holding the largest count, if any bin is populated.
    pub fn max_bin(&self) -> Option<(usize, u64)> {
        self.counts
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, count)| *count > 0)
            .fold(None, |best, (bin, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((bin, count)),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    id: HistogramId,
    x_binning: Binning,
    y_binning: Binning,
    counts: Vec<u64>,
    out_of_range: u64,
    undefined: u64,
}

impl Histogram2D {
    pub fn id(&self) -> &HistogramId {
        &self.id
    }

    /// `(x, y)` variables of the map.
    pub fn axes(&self) -> (&Variable, &Variable) {
        match &self.id {
            HistogramId::TwoD { x, y } => (x, y),
            HistogramId::OneD(variable) => (variable, variable),
        }
    }

    pub fn x_binning(&self) -> Binning {
        self.x_binning
    }

    pub fn y_binning(&self) -> Binning {
        self.y_binning
    }

    pub fn count(&self, x_bin: usize, y_bin: usize) -> u64 {
        self.counts[y_bin * self.x_binning.bins + x_bin]
    }

    pub fn entries(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn out_of_range(&self) -> u64 {
        self.out_of_range
    }

    pub fn undefined(&self) -> u64 {
        self.undefined
    }

    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Non-empty cells as `(x_bin, y_bin, count)`, row by row.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, u64)> + '_ {
        let columns = self.x_binning.bins;
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(move |(index, count)| (index % columns, index / columns, *count))
    }
}

pub fn build_1d(
    variable: Variable,
    values: &[f64],
    binning: Binning,
) -> AnalysisResult<Histogram1D> {
    binning.validate()?;

    let mut histogram = Histogram1D {
        id: HistogramId::OneD(variable),
        binning,
        counts: vec![0; binning.bins],
        underflow: 0,
        overflow: 0,
        undefined: 0,
    };

    for &value in values {
        match binning.slot(value) {
            BinSlot::Bin(bin) => histogram.counts[bin] += 1,
            BinSlot::Underflow => histogram.underflow += 1,
            BinSlot::Overflow => histogram.overflow += 1,
            BinSlot::Undefined => histogram.undefined += 1,
        }
    }

    Ok(histogram)
}

pub fn build_2d(
    x: Variable,
    y: Variable,
    xs: &[f64],
    ys: &[f64],
    x_binning: Binning,
    y_binning: Binning,
) -> AnalysisResult<Histogram2D> {
    if xs.len() != ys.len() {
        return Err(AnalysisError::DimensionMismatch {
            x_len: xs.len(),
            y_len: ys.len(),
        });
    }
    x_binning.validate()?;
    y_binning.validate()?;

    let mut histogram = Histogram2D {
        id: HistogramId::TwoD { x, y },
        x_binning,
        y_binning,
        counts: vec![0; x_binning.bins * y_binning.bins],
        out_of_range: 0,
        undefined: 0,
    };

    for (&x_value, &y_value) in xs.iter().zip(ys) {
        match (x_binning.slot(x_value), y_binning.slot(y_value)) {
            (BinSlot::Bin(x_bin), BinSlot::Bin(y_bin)) => {
                histogram.counts[y_bin * x_binning.bins + x_bin] += 1;
            }
            (BinSlot::Undefined, _) | (_, BinSlot::Undefined) => histogram.undefined += 1,
            _ => histogram.out_of_range += 1,
        }
    }

    Ok(histogram)
}
