// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parser for the controller's streaming line protocol.
//!
//! The controller pushes roughly one line per probe per second:
//!
//! ```text
//! 2B0000110A442730: 1.0 4.0 39.2 -7.5 -0.2 0.2 -0.0 0.3 32.4
//! 2A0000110A314B30: 1.0 3.8 38.8 142.5 3.6 0.1 3.7 91.7 197.0 PID: NORM tgt:107.2 error:77.7 drive:2.0 istate:18.2 on:1 off:0 blwr:on
//! ```
//!
//! The first token is the probe id followed by `:`. Food probes carry exactly nine value fields;
//! pit probes carry the same nine followed by `PID:` and the controller state. The temperature is
//! always value field 8. Anything shorter is a status message and is ignored.

use crate::constants::{
    FOOD_FIELD_COUNT, MARKER_FIELD, PID_MARKER, TEMPERATURE_FIELD, UNKNOWN_BLOWER,
};
use crate::errors::ParseError;
use crate::reading::{PidState, ProbeKind, ProbeReading};

/// Classification of one line from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LineRecord {
    Probe(ProbeReading),
    /// Status output or anything else that is not a probe record
    Ignored,
}

/// Parses one line from the controller stream.
///
/// Returns [`LineRecord::Ignored`] for lines that are not probe records and an error for records
/// that cannot be applied. Parsing is pure; applying the reading is up to the caller.
pub fn parse_line(line: &str) -> Result<LineRecord, ParseError> {
    let mut tokens = line.split_whitespace();
    let id = match tokens.next().and_then(|t| t.strip_suffix(':')) {
        Some(id) if !id.is_empty() => id,
        _ => return Ok(LineRecord::Ignored),
    };
    let fields: Vec<&str> = tokens.collect();

    if fields.len() < FOOD_FIELD_COUNT {
        return Ok(LineRecord::Ignored);
    }

    let kind = if fields.len() == FOOD_FIELD_COUNT {
        ProbeKind::Food
    } else if fields[MARKER_FIELD] == PID_MARKER {
        ProbeKind::Pit
    } else {
        return Err(ParseError::UnknownProbeType {
            id: id.to_string(),
            marker: fields[MARKER_FIELD].to_string(),
        });
    };

    let raw_temperature = fields[TEMPERATURE_FIELD];
    let temperature = raw_temperature
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| ParseError::Temperature {
            id: id.to_string(),
            value: raw_temperature.to_string(),
        })?;

    let mut reading = ProbeReading::new(id, kind, temperature);
    if kind == ProbeKind::Pit {
        let pid = parse_pid_fields(&fields[MARKER_FIELD + 1..]);
        reading.target = pid.target;
        reading.blower = Some(UNKNOWN_BLOWER.to_string());
        reading.pid = Some(pid);
    }
    Ok(LineRecord::Probe(reading))
}

/// Extracts controller state from the fields after `PID:`. Every field is optional and a
/// malformed one is left unset rather than failing the record.
fn parse_pid_fields(fields: &[&str]) -> PidState {
    let mut pid = PidState::default();
    for field in fields {
        let Some((key, value)) = field.split_once(':') else {
            if pid.mode.is_none() {
                pid.mode = Some((*field).to_string());
            }
            continue;
        };
        let number = || value.parse::<f64>().ok().filter(|v| v.is_finite());
        match key {
            "tgt" => pid.target = number(),
            "error" => pid.error = number(),
            "drive" => pid.drive = number(),
            "istate" => pid.integral = number(),
            "blwr" => {
                pid.blower_on = match value {
                    "on" => Some(true),
                    "off" => Some(false),
                    _ => None,
                }
            }
            _ => {}
        }
    }
    pid
}
