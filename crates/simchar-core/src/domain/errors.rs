use std::path::PathBuf;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Success,
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl ErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InputValidationError => 2,
            Self::IoSystemError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::InputValidationError => "InputValidationError",
            Self::IoSystemError => "IoSystemError",
            Self::ComputationError => "ComputationError",
            Self::InternalError => "InternalError",
        }
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("input file '{}' is not readable: {source}", path.display())]
    FileNotFound {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed record at line {line}: {reason} (line content: '{content}')")]
    MalformedRecord {
        line: usize,
        content: String,
        reason: String,
    },
    #[error(
        "unknown variable '{name}'; expected one of n, tof, x, y, z, vx, vy, vz, ke or an expression over them"
    )]
    UnknownVariable { name: String },
    #[error("invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
    #[error("paired columns differ in length: x has {x_len} values, y has {y_len}")]
    DimensionMismatch { x_len: usize, y_len: usize },
    #[error("invalid binning: {reason}")]
    InvalidBinning { reason: String },
    #[error("failed to write report '{}': {source}", path.display())]
    ReportWrite {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to export plot '{}': {message}", path.display())]
    PlotExport { path: PathBuf, message: String },
}

impl AnalysisError {
    pub fn invalid_binning(reason: impl Into<String>) -> Self {
        Self::InvalidBinning {
            reason: reason.into(),
        }
    }

    pub fn unknown_variable(name: impl Into<String>) -> Self {
        Self::UnknownVariable { name: name.into() }
    }

    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::FileNotFound { .. } | Self::ReportWrite { .. } | Self::PlotExport { .. } => {
                ErrorCategory::IoSystemError
            }
            Self::MalformedRecord { .. }
            | Self::UnknownVariable { .. }
            | Self::InvalidExpression { .. }
            | Self::InvalidBinning { .. } => ErrorCategory::InputValidationError,
            Self::DimensionMismatch { .. } => ErrorCategory::ComputationError,
        }
    }

    pub const fn placeholder(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } => "IO.INPUT_NOT_FOUND",
            Self::MalformedRecord { .. } => "INPUT.MALFORMED_RECORD",
            Self::UnknownVariable { .. } => "INPUT.UNKNOWN_VARIABLE",
            Self::InvalidExpression { .. } => "INPUT.INVALID_EXPRESSION",
            Self::DimensionMismatch { .. } => "RUN.DIMENSION_MISMATCH",
            Self::InvalidBinning { .. } => "INPUT.INVALID_BINNING",
            Self::ReportWrite { .. } => "IO.REPORT_WRITE",
            Self::PlotExport { .. } => "IO.PLOT_EXPORT",
        }
    }

    pub const fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category().is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.placeholder(), self)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category()
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}
