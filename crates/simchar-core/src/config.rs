//! JSON-loadable analysis settings.
//!
//! Every key is optional; an empty object `{}` yields [`AnalysisConfig::default`].
//!
//! Record columns without a `binning` override use [`column_binning`], 200
//! bins over a range sized for the column's SIMION unit:
//!
//! | column | range |
//! |---|---|
//! | `n` | `[0, 50000)` |
//! | `tof` | `[0, 100)` us |
//! | `x`, `y` | `[-50, 50)` mm |
//! | `z` | `[0, 1000)` mm |
//! | `vx`, `vy` | `[-5, 5)` mm/us |
//! | `vz` | `[0, 100)` mm/us |
//! | `ke` | `[0, 2000)` eV |

use crate::domain::{AnalysisError, AnalysisResult, Field, Variable};
use crate::fitting::FitSettings;
use crate::histogram::Binning;
use crate::plotting::PlotFormat;
use crate::records::ParseOptions;
use crate::report::ReportMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_ENTRIES: usize = 50_000;

const DEFAULT_VARIABLES: [&str; 8] = ["tof", "x", "y", "z", "vx", "vy", "vz", "ke"];
const DEFAULT_BINS: usize = 200;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Variables to histogram and fit, in report order.
    pub variables: Vec<String>,
    /// Rows used per histogram, counted from the top of the file. `None` uses all.
    pub max_entries: Option<usize>,
    /// Fallback for derived expressions, which are angles more often than not.
    pub derived_binning: Binning,
    /// Per-variable overrides keyed by variable name or expression label.
    pub binning: BTreeMap<String, Binning>,
    pub fit: FitSettings,
    pub correlations: Vec<[String; 2]>,
    /// Correlate every unordered pair of `variables` instead of `correlations`.
    pub all_pairs: bool,
    pub emittance: Vec<EmittancePair>,
    pub report_mode: ReportMode,
    pub plots: PlotSettings,
    pub parse: ParseOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            variables: DEFAULT_VARIABLES.iter().map(|name| name.to_string()).collect(),
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            derived_binning: Binning {
                bins: DEFAULT_BINS,
                min: -0.5,
                max: 0.5,
            },
            binning: BTreeMap::new(),
            fit: FitSettings::default(),
            correlations: vec![["x".to_string(), "vx".to_string()]],
            all_pairs: false,
            emittance: vec![
                EmittancePair {
                    position: "x".to_string(),
                    velocity: "vx".to_string(),
                },
                EmittancePair {
                    position: "y".to_string(),
                    velocity: "vy".to_string(),
                },
            ],
            report_mode: ReportMode::default(),
            plots: PlotSettings::default(),
            parse: ParseOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmittancePair {
    pub position: String,
    pub velocity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlotSettings {
    pub enabled: bool,
    pub format: PlotFormat,
    pub width: u32,
    pub height: u32,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            format: PlotFormat::default(),
            width: 1024,
            height: 720,
        }
    }
}

/// Default range of a record column. Transverse positions and velocities are
/// signed and centred on the beam axis.
pub const fn column_binning(field: Field) -> Binning {
    let (min, max) = match field {
        Field::Index => (0.0, 50_000.0),
        Field::TimeOfFlight => (0.0, 100.0),
        Field::X | Field::Y => (-50.0, 50.0),
        Field::Z => (0.0, 1000.0),
        Field::Vx | Field::Vy => (-5.0, 5.0),
        Field::Vz => (0.0, 100.0),
        Field::KineticEnergy => (0.0, 2000.0),
    };
    Binning {
        bins: DEFAULT_BINS,
        min,
        max,
    }
}

impl AnalysisConfig {
    /// Override by name first, then the column or derived default.
    pub fn binning_for(&self, variable: &Variable) -> Binning {
        if let Some(binning) = self.binning.get(variable.name()) {
            return *binning;
        }
        match variable {
            Variable::Field(field) => column_binning(*field),
            Variable::Derived { .. } => self.derived_binning,
        }
    }

    pub fn resolve_variables(&self) -> AnalysisResult<Vec<Variable>> {
        self.variables
            .iter()
            .map(|name| Variable::parse(name))
            .collect()
    }

    pub fn resolve_correlations(&self) -> AnalysisResult<Vec<(Variable, Variable)>> {
        self.correlations
            .iter()
            .map(|[x, y]| Ok((Variable::parse(x)?, Variable::parse(y)?)))
            .collect()
    }

    /// Emittance axes must be plain record columns.
    pub fn resolve_emittance(&self) -> AnalysisResult<Vec<(Field, Field)>> {
        self.emittance
            .iter()
            .map(|pair| Ok((schema_field(&pair.position)?, schema_field(&pair.velocity)?)))
            .collect()
    }

    /// Rejects unusable ranges before any data is read.
    pub fn validate(&self) -> AnalysisResult<()> {
        self.derived_binning.validate()?;
        for (name, binning) in &self.binning {
            binning.validate().map_err(|error| match error {
                AnalysisError::InvalidBinning { reason } => {
                    AnalysisError::invalid_binning(format!("'{name}': {reason}"))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

fn schema_field(name: &str) -> AnalysisResult<Field> {
    Field::from_name(name).ok_or_else(|| AnalysisError::unknown_variable(name))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read analysis config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse analysis config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub fn load_analysis_config(
    config_path: impl AsRef<Path>,
) -> Result<AnalysisConfig, ConfigError> {
    let config_path = config_path.as_ref();
    let source = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
        path: config_path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&source).map_err(|source| ConfigError::Parse {
        path: config_path.to_path_buf(),
        source,
    })
}
