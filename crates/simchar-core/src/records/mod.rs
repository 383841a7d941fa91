mod parser;

use crate::domain::{AnalysisError, AnalysisResult, Field, Variable};
use crate::expression::Expression;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use parser::{is_data_line, parse_record_line};

/// One simulated particle sample, in the fixed SIMION record order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub index: u32,
    pub time_of_flight: f64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub kinetic_energy: f32,
}

impl Record {
    pub fn value(&self, field: Field) -> f64 {
        match field {
            Field::Index => f64::from(self.index),
            Field::TimeOfFlight => self.time_of_flight,
            Field::X => f64::from(self.x),
            Field::Y => f64::from(self.y),
            Field::Z => f64::from(self.z),
            Field::Vx => f64::from(self.vx),
            Field::Vy => f64::from(self.vy),
            Field::Vz => f64::from(self.vz),
            Field::KineticEnergy => f64::from(self.kinetic_energy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParseOptions {
    /// Lines whose first non-blank characters match this marker are skipped.
    pub comment_marker: String,
    /// Physical lines dropped before any parsing, e.g. a raw SIMION header.
    pub skip_header_lines: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            comment_marker: "#".to_string(),
            skip_header_lines: 0,
        }
    }
}

/// Parsed trajectory records in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    records: Vec<Record>,
}

impl RecordTable {
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn from_path(path: impl AsRef<Path>) -> AnalysisResult<Self> {
        Self::from_path_with_options(path, &ParseOptions::default())
    }

    pub fn from_path_with_options(
        path: impl AsRef<Path>,
        options: &ParseOptions,
    ) -> AnalysisResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| AnalysisError::FileNotFound {
            path: path.to_path_buf(),
            source,
        })?;

        let table = Self::parse_str(&source, options)?;
        info!(
            path = %path.display(),
            rows = table.len(),
            "parsed trajectory records"
        );
        Ok(table)
    }

    /// Parses record text; the first malformed data line aborts the parse.
    pub fn parse_str(source: &str, options: &ParseOptions) -> AnalysisResult<Self> {
        let mut records = Vec::new();
        for (index, line) in source.lines().enumerate().skip(options.skip_header_lines) {
            if !is_data_line(line, options) {
                continue;
            }
            records.push(parse_record_line(index + 1, line)?);
        }

        debug!(
            rows = records.len(),
            skipped_header_lines = options.skip_header_lines,
            "record text parsed"
        );
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn column(&self, name: &str) -> AnalysisResult<Vec<f64>> {
        let field = Field::from_name(name).ok_or_else(|| AnalysisError::unknown_variable(name))?;
        Ok(self.field_column(field))
    }

    pub fn field_column(&self, field: Field) -> Vec<f64> {
        self.records
            .iter()
            .map(|record| record.value(field))
            .collect()
    }

    /// Evaluates `expression` per row; undefined rows are `NaN`.
    pub fn derived_column(&self, expression: &Expression) -> Vec<f64> {
        self.records
            .iter()
            .map(|record| expression.evaluate(record))
            .collect()
    }

    pub fn values(&self, variable: &Variable) -> Vec<f64> {
        match variable {
            Variable::Field(field) => self.field_column(*field),
            Variable::Derived { expression, .. } => self.derived_column(expression),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ParseOptions, RecordTable};
    use crate::domain::{AnalysisError, Field, Variable};
    use crate::expression::Expression;
    use std::fs;
    use tempfile::TempDir;

    const THREE_ROWS: &str = "\
# n tof x y z vx vy vz ke
1 0.0 0 0 0 1 0 10 5

2 0.0 0 0 0 1 0 0 5
3 0.0 0 0 0 1 0 10 5
";

    #[test]
    fn row_count_matches_data_lines() {
        let table =
            RecordTable::parse_str(THREE_ROWS, &ParseOptions::default()).expect("table should parse");
        assert_eq!(table.len(), 3);
        assert_eq!(table.records()[1].index, 2);
    }

    #[test]
    fn column_returns_values_in_row_order() {
        let table =
            RecordTable::parse_str(THREE_ROWS, &ParseOptions::default()).expect("table should parse");
        assert_eq!(table.column("vx").expect("vx exists"), vec![1.0, 1.0, 1.0]);
        assert_eq!(table.column("n").expect("n exists"), vec![1.0, 2.0, 3.0]);
        assert_eq!(table.column("x").expect("x exists").len(), table.len());
    }

    #[test]
    fn unknown_column_fails() {
        let table =
            RecordTable::parse_str(THREE_ROWS, &ParseOptions::default()).expect("table should parse");
        let error = table.column("energy").expect_err("unknown column should fail");
        assert!(matches!(error, AnalysisError::UnknownVariable { .. }));
    }

    #[test]
    fn derived_angle_is_undefined_only_where_vz_is_zero() {
        let table =
            RecordTable::parse_str(THREE_ROWS, &ParseOptions::default()).expect("table should parse");
        let expression = Expression::parse("atan(vx/vz)").expect("expression should parse");
        let angles = table.derived_column(&expression);

        assert_eq!(angles.len(), 3);
        assert!((angles[0] - 0.1_f64.atan()).abs() < 1e-12);
        assert!(angles[1].is_nan());
        assert!((angles[2] - 0.1_f64.atan()).abs() < 1e-12);

        let via_variable = table.values(&Variable::divergence_angle(Field::X, Field::Vx));
        assert!(via_variable[1].is_nan());
        assert_eq!(via_variable[0], angles[0]);
    }

    #[test]
    fn header_lines_are_skipped_before_comment_detection() {
        let source = "SIMION header line 1\nheader 2 has words\n1 0.5 1 2 3 4 5 6 7\n";
        let options = ParseOptions {
            skip_header_lines: 2,
            ..ParseOptions::default()
        };

        let table = RecordTable::parse_str(source, &options).expect("table should parse");
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].kinetic_energy, 7.0);

        let error = RecordTable::parse_str(source, &ParseOptions::default())
            .expect_err("header without skipping should be malformed");
        assert!(matches!(error, AnalysisError::MalformedRecord { line: 1, .. }));
    }

    #[test]
    fn parse_is_fail_fast_on_first_bad_line() {
        let source = "1 0 0 0 0 0 0 1 1\n2 0 0 0 0 0 0 1\n3 0 0 0 0 0 0 1 bad\n";
        let error = RecordTable::parse_str(source, &ParseOptions::default())
            .expect_err("malformed line should abort");
        assert!(matches!(error, AnalysisError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn formatted_records_round_trip_through_the_parser() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("trajectories.txt");
        let x_values = [0.125_f32, -3.75, 12.3456, 1.0e-3];
        let mut content = String::from("# round trip\n");
        for (index, x) in x_values.iter().enumerate() {
            content.push_str(&format!(
                "{} {:.9} {} 0.5 1.5 0.01 0.02 {} 12.5\n",
                index + 1,
                1.5 + index as f64,
                x,
                9.0 + index as f32
            ));
        }
        fs::write(&path, content).expect("fixture should be written");

        let table = RecordTable::from_path(&path).expect("table should load");
        let xs = table.column("x").expect("x exists");
        assert_eq!(xs.len(), x_values.len());
        for (parsed, original) in xs.iter().zip(x_values) {
            assert_eq!(*parsed as f32, original);
        }
        assert_eq!(table.column("tof").expect("tof exists")[2], 3.5);
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let temp = TempDir::new().expect("tempdir should be created");
        let error = RecordTable::from_path(temp.path().join("absent.txt"))
            .expect_err("missing file should fail");
        assert!(matches!(error, AnalysisError::FileNotFound { .. }));
        assert_eq!(error.exit_code(), 3);
    }
}
