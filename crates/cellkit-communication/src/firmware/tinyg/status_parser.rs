//! TinyG text status parsing
//!
//! The `?` query answers with one field per line:
//!
//! ```text
//! X position: 12.500 mm
//! Feed rate: 2000.000 mm/min
//! Machine state: Ready
//! ```
//!
//! Fields are recognised by their label prefix. A line whose label is known
//! but whose value does not parse is reported as a [`ProtocolError`] so the
//! caller can skip it; unknown lines are ignored.

use cellkit_core::{Position, ProtocolError};
use serde::{Deserialize, Serialize};

/// One recognised status field
#[derive(Debug, Clone, PartialEq)]
pub enum StatusField {
    X(f64),
    Y(f64),
    Z(f64),
    A(f64),
    FeedRate(f64),
    Velocity(f64),
    MachineState(String),
}

/// Accumulated controller status
///
/// Every field is optional: a reply only overwrites what it carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub a: Option<f64>,
    pub feed_rate: Option<f64>,
    pub velocity: Option<f64>,
    pub machine_state: Option<String>,
}

impl StatusReport {
    /// Fold one field into the report
    pub fn apply(&mut self, field: StatusField) {
        match field {
            StatusField::X(v) => self.x = Some(v),
            StatusField::Y(v) => self.y = Some(v),
            StatusField::Z(v) => self.z = Some(v),
            StatusField::A(v) => self.a = Some(v),
            StatusField::FeedRate(v) => self.feed_rate = Some(v),
            StatusField::Velocity(v) => self.velocity = Some(v),
            StatusField::MachineState(s) => self.machine_state = Some(s),
        }
    }

    /// Overlay the reported axes onto a known position
    pub fn merge_position(&self, known: Position) -> Position {
        Position {
            x: self.x.unwrap_or(known.x),
            y: self.y.unwrap_or(known.y),
            z: self.z.unwrap_or(known.z),
            a: self.a.unwrap_or(known.a),
        }
    }

    pub fn has_position(&self) -> bool {
        self.x.is_some() || self.y.is_some() || self.z.is_some() || self.a.is_some()
    }
}

/// TinyG status line parser
pub struct StatusParser;

impl StatusParser {
    /// Parse one reply line
    ///
    /// `Ok(None)` for lines that carry no status field (acks, echoes).
    pub fn parse_line(line: &str) -> Result<Option<StatusField>, ProtocolError> {
        let line = line.trim();
        let Some((label, value)) = line.split_once(':') else {
            return Ok(None);
        };

        let numeric = |make: fn(f64) -> StatusField| {
            first_number(value)
                .map(|v| Some(make(v)))
                .ok_or_else(|| ProtocolError::Unparseable {
                    field: label.trim().to_string(),
                    line: line.to_string(),
                })
        };

        match label.trim() {
            "X position" => numeric(StatusField::X),
            "Y position" => numeric(StatusField::Y),
            "Z position" => numeric(StatusField::Z),
            "A position" => numeric(StatusField::A),
            "Feed rate" => numeric(StatusField::FeedRate),
            "Velocity" => numeric(StatusField::Velocity),
            "Machine state" => {
                let state = value.trim();
                if state.is_empty() {
                    Err(ProtocolError::Unparseable {
                        field: "Machine state".to_string(),
                        line: line.to_string(),
                    })
                } else {
                    Ok(Some(StatusField::MachineState(state.to_string())))
                }
            }
            _ => Ok(None),
        }
    }

    /// Parse a whole reply, skipping fields that fail to parse
    pub fn parse_reply<S: AsRef<str>>(lines: &[S]) -> StatusReport {
        let mut report = StatusReport::default();
        for line in lines {
            match Self::parse_line(line.as_ref()) {
                Ok(Some(field)) => report.apply(field),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping status field: {}", e),
            }
        }
        report
    }
}

/// First signed decimal number in `text`
fn first_number(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let is_num = |b: u8| b.is_ascii_digit() || b == b'.' || b == b'-' || b == b'+';

    let start = bytes.iter().position(|&b| is_num(b))?;
    let len = bytes[start..]
        .iter()
        .position(|&b| !is_num(b))
        .unwrap_or(bytes.len() - start);
    text[start..start + len].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position_lines() {
        assert_eq!(
            StatusParser::parse_line("X position: 12.500 mm").unwrap(),
            Some(StatusField::X(12.5))
        );
        assert_eq!(
            StatusParser::parse_line("A position:-90.0 deg").unwrap(),
            Some(StatusField::A(-90.0))
        );
        assert_eq!(
            StatusParser::parse_line("Machine state: Run").unwrap(),
            Some(StatusField::MachineState("Run".to_string()))
        );
    }

    #[test]
    fn test_unrecognised_lines_are_ignored() {
        assert_eq!(StatusParser::parse_line("ok").unwrap(), None);
        assert_eq!(StatusParser::parse_line("Units: mm").unwrap(), None);
        assert_eq!(StatusParser::parse_line("").unwrap(), None);
    }

    #[test]
    fn test_bad_value_is_protocol_error() {
        let err = StatusParser::parse_line("Velocity: fast").unwrap_err();
        assert!(matches!(err, ProtocolError::Unparseable { ref field, .. } if field == "Velocity"));
        assert!(StatusParser::parse_line("X position: -.-").is_err());
    }

    #[test]
    fn test_reply_skips_bad_fields_and_merges() {
        let reply = [
            "X position: 10.000 mm",
            "Y position: garbage",
            "Feed rate: 1500 mm/min",
            "ok",
        ];
        let report = StatusParser::parse_reply(&reply);
        assert_eq!(report.x, Some(10.0));
        assert_eq!(report.y, None);
        assert_eq!(report.feed_rate, Some(1500.0));

        let merged = report.merge_position(Position::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(merged, Position::new(10.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number(" 3.25 mm"), Some(3.25));
        assert_eq!(first_number("abc"), None);
        assert_eq!(first_number("-7"), Some(-7.0));
    }
}
