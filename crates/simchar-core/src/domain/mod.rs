pub mod errors;

pub use errors::{AnalysisError, AnalysisResult, ErrorCategory};

use crate::expression::Expression;
use std::fmt::{Display, Formatter};

/// Columns of the fixed trajectory record schema, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Index,
    TimeOfFlight,
    X,
    Y,
    Z,
    Vx,
    Vy,
    Vz,
    KineticEnergy,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Self::Index,
        Self::TimeOfFlight,
        Self::X,
        Self::Y,
        Self::Z,
        Self::Vx,
        Self::Vy,
        Self::Vz,
        Self::KineticEnergy,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "n",
            Self::TimeOfFlight => "tof",
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::Vx => "vx",
            Self::Vy => "vy",
            Self::Vz => "vz",
            Self::KineticEnergy => "ke",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "n" | "index" => Some(Self::Index),
            "tof" | "timeOfFlight" | "time_of_flight" => Some(Self::TimeOfFlight),
            "x" => Some(Self::X),
            "y" => Some(Self::Y),
            "z" => Some(Self::Z),
            "vx" => Some(Self::Vx),
            "vy" => Some(Self::Vy),
            "vz" => Some(Self::Vz),
            "ke" | "kineticEnergy" | "kinetic_energy" => Some(Self::KineticEnergy),
            _ => None,
        }
    }

    /// SIMION's native unit for the column, used in axis labels.
    pub const fn unit(self) -> Option<&'static str> {
        match self {
            Self::Index => None,
            Self::TimeOfFlight => Some("us"),
            Self::X | Self::Y | Self::Z => Some("mm"),
            Self::Vx | Self::Vy | Self::Vz => Some("mm/us"),
            Self::KineticEnergy => Some("eV"),
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// A quantity that can be histogrammed: a base column or a row-wise expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Field(Field),
    Derived {
        label: String,
        expression: Expression,
    },
}

impl Variable {
    /// Resolves a schema column name first, then falls back to an expression.
    pub fn parse(text: &str) -> AnalysisResult<Self> {
        if let Some(field) = Field::from_name(text) {
            return Ok(Self::Field(field));
        }

        let expression = Expression::parse(text)?;
        Ok(Self::Derived {
            label: expression.source().to_string(),
            expression,
        })
    }

    /// Divergence angle `atan(velocity / vz)` labelled `<position>'`.
    pub fn divergence_angle(position: Field, velocity: Field) -> Self {
        Self::Derived {
            label: format!("{position}'"),
            expression: Expression::divergence_angle(velocity),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Field(field) => field.as_str(),
            Self::Derived { label, .. } => label,
        }
    }

    pub fn axis_label(&self) -> String {
        match self {
            Self::Field(field) => match field.unit() {
                Some(unit) => format!("{} [{}]", field, unit),
                None => field.to_string(),
            },
            Self::Derived { label, expression } if expression.is_angle() => {
                format!("{label} [rad]")
            }
            Self::Derived { label, .. } => label.clone(),
        }
    }
}

impl From<Field> for Variable {
    fn from(field: Field) -> Self {
        Self::Field(field)
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of a histogram: the variable(s) it bins, one axis or two.
#[derive(Debug, Clone, PartialEq)]
pub enum HistogramId {
    OneD(Variable),
    TwoD { x: Variable, y: Variable },
}

impl Display for HistogramId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneD(variable) => write!(f, "{variable}"),
            Self::TwoD { x, y } => write!(f, "{y}:{x}"),
        }
    }
}
