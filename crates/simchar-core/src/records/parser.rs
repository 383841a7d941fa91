use super::{ParseOptions, Record};
use crate::domain::{AnalysisError, AnalysisResult, Field};
use std::str::FromStr;

pub(super) const RECORD_FIELD_COUNT: usize = Field::ALL.len();

/// Whether a physical line carries a record, after header skipping.
pub(super) fn is_data_line(line: &str, options: &ParseOptions) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }

    options.comment_marker.is_empty() || !trimmed.starts_with(options.comment_marker.as_str())
}

pub(super) fn parse_record_line(line_number: usize, line: &str) -> AnalysisResult<Record> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if tokens.len() != RECORD_FIELD_COUNT {
        return Err(malformed(
            line_number,
            line,
            format!(
                "expected {} fields (n tof x y z vx vy vz ke), found {}",
                RECORD_FIELD_COUNT,
                tokens.len()
            ),
        ));
    }

    Ok(Record {
        index: parse_index(line_number, line, tokens[0])?,
        time_of_flight: parse_token(line_number, line, Field::TimeOfFlight, tokens[1])?,
        x: parse_token(line_number, line, Field::X, tokens[2])?,
        y: parse_token(line_number, line, Field::Y, tokens[3])?,
        z: parse_token(line_number, line, Field::Z, tokens[4])?,
        vx: parse_token(line_number, line, Field::Vx, tokens[5])?,
        vy: parse_token(line_number, line, Field::Vy, tokens[6])?,
        vz: parse_token(line_number, line, Field::Vz, tokens[7])?,
        kinetic_energy: parse_token(line_number, line, Field::KineticEnergy, tokens[8])?,
    })
}

fn parse_index(line_number: usize, line: &str, token: &str) -> AnalysisResult<u32> {
    if let Ok(value) = token.parse::<u32>() {
        return Ok(value);
    }

    // Some exports write the ion number as a float ("12.0").
    match token.parse::<f64>() {
        Ok(value) if value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) => {
            Ok(value as u32)
        }
        _ => Err(malformed(
            line_number,
            line,
            format!("field 'n' is not an unsigned integer: '{token}'"),
        )),
    }
}

fn parse_token<T: FromStr>(
    line_number: usize,
    line: &str,
    field: Field,
    token: &str,
) -> AnalysisResult<T> {
    token.parse::<T>().map_err(|_| {
        malformed(
            line_number,
            line,
            format!("field '{field}' is not numeric: '{token}'"),
        )
    })
}

fn malformed(line_number: usize, line: &str, reason: String) -> AnalysisError {
    AnalysisError::MalformedRecord {
        line: line_number,
        content: line.trim_end().to_string(),
        reason,
    }
}
