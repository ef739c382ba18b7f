// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types and the failure categories they are counted under.

use crate::reading::ProbeKind;
use std::fmt;

/// Category a failure is counted under in the exported failure counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureCategory {
    Dial,
    ReadLine,
    ParseFloat,
    UnknownProbe,
    KindMismatch,
    Fetch,
    HttpStatus,
    Decode,
    EmptyResult,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dial => "dial",
            Self::ReadLine => "readLine",
            Self::ParseFloat => "parseFloat",
            Self::UnknownProbe => "unknownProbe",
            Self::KindMismatch => "kindMismatch",
            Self::Fetch => "fetch",
            Self::HttpStatus => "httpStatus",
            Self::Decode => "decode",
            Self::EmptyResult => "emptyResult",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line that looked like a probe record but could not be turned into a reading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("failed to parse temperature {value:?} for probe {id}")]
    Temperature { id: String, value: String },
    #[error("unknown probe type for {id}: unexpected marker {marker:?}")]
    UnknownProbeType { id: String, marker: String },
}

impl ParseError {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Temperature { .. } => FailureCategory::ParseFloat,
            Self::UnknownProbeType { .. } => FailureCategory::UnknownProbe,
        }
    }
}

/// A decoded JSON payload that fails validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("no sensors found")]
    NoSensors,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("probe {id} changed kind from {existing} to {incoming}")]
    KindMismatch {
        id: String,
        existing: ProbeKind,
        incoming: ProbeKind,
    },
}

impl StoreError {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::KindMismatch { .. } => FailureCategory::KindMismatch,
        }
    }
}

/// Failure of one polling cycle.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to fetch payload: {0}")]
    Fetch(#[source] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("failed to decode payload: {0}")]
    Decode(#[source] reqwest::Error),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl CollectError {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Fetch(_) => FailureCategory::Fetch,
            Self::HttpStatus(_) => FailureCategory::HttpStatus,
            Self::Decode(_) => FailureCategory::Decode,
            Self::Payload(PayloadError::NoSensors) => FailureCategory::EmptyResult,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("one of STOKER_ADDR or STOKER_URL must be set")]
    MissingSource,
    #[error("STOKER_ADDR and STOKER_URL are mutually exclusive")]
    ConflictingSources,
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("metrics listener failed: {0}")]
    Accept(#[source] std::io::Error),
}
