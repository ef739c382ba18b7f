// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed readings produced by the parsers and consumed by the state store.

use std::fmt;

/// Kind of temperature probe. The controller never declares it; it is derived from the shape of
/// the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProbeKind {
    Food,
    Pit,
    Unknown,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Pit => "pit",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller state carried by pit records after the `PID:` marker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PidState {
    pub mode: Option<String>,
    /// Target pit temperature in Celsius
    pub target: Option<f64>,
    pub error: Option<f64>,
    pub drive: Option<f64>,
    pub integral: Option<f64>,
    pub blower_on: Option<bool>,
}

/// One successfully parsed probe reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReading {
    pub id: String,
    pub kind: ProbeKind,
    /// Celsius
    pub temperature: f64,
    /// Sanitized friendly name, only known in polling mode
    pub name: Option<String>,
    /// Id of the blower driving this probe, or [`crate::constants::UNKNOWN_BLOWER`]
    pub blower: Option<String>,
    /// Target temperature in Celsius, when the controller reports one
    pub target: Option<f64>,
    pub pid: Option<PidState>,
}

impl ProbeReading {
    pub fn new(id: impl Into<String>, kind: ProbeKind, temperature: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            temperature,
            name: None,
            blower: None,
            target: None,
            pid: None,
        }
    }
}

/// One blower as reported by the JSON endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct BlowerReading {
    pub id: String,
    pub name: Option<String>,
    pub on: bool,
}
