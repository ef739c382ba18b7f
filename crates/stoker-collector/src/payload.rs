// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of the controller's JSON status document.
//!
//! ```json
//! {"stoker":{
//!   "sensors":[{"id":"2A0000110A314B30","name":"Pit","tc":107.2,"ta":110.0,"blower":"8D0000001B9F5F05"}],
//!   "blowers":[{"id":"8D0000001B9F5F05","name":"Blower 1","on":1}]
//! }}
//! ```

use crate::errors::PayloadError;
use crate::reading::{BlowerReading, ProbeKind, ProbeReading};
use crate::util::sanitize_name;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct StatusDocument {
    pub stoker: Stoker,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Stoker {
    #[serde(default)]
    pub sensors: Vec<Sensor>,
    #[serde(default)]
    pub blowers: Vec<Blower>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sensor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Current temperature, Celsius
    pub tc: f64,
    /// Target temperature, Celsius
    #[serde(default)]
    pub ta: Option<f64>,
    #[serde(default)]
    pub blower: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Blower {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub on: u8,
}

/// Entities decoded from one status document, ready to replace the stored state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolledState {
    pub sensors: Vec<ProbeReading>,
    pub blowers: Vec<BlowerReading>,
}

impl StatusDocument {
    /// Validates the document and converts it into readings.
    ///
    /// A document without sensors is rejected as a whole, blowers included. Entries with an empty
    /// id are skipped.
    pub fn into_state(self) -> Result<PolledState, PayloadError> {
        let Stoker { sensors, blowers } = self.stoker;
        if sensors.is_empty() {
            return Err(PayloadError::NoSensors);
        }

        let sensors = sensors
            .into_iter()
            .filter(|s| {
                if s.id.is_empty() {
                    debug!("Skipping sensor with empty id");
                }
                !s.id.is_empty()
            })
            .map(Sensor::into_reading)
            .collect();

        let blowers = blowers
            .into_iter()
            .filter(|b| {
                if b.id.is_empty() {
                    debug!("Skipping blower with empty id");
                }
                !b.id.is_empty()
            })
            .map(|b| BlowerReading {
                name: non_empty(sanitize_name(&b.name)),
                id: b.id,
                on: b.on != 0,
            })
            .collect();

        Ok(PolledState { sensors, blowers })
    }
}

impl Sensor {
    fn into_reading(self) -> ProbeReading {
        let blower = self.blower.filter(|b| !b.is_empty());
        let kind = if blower.is_some() {
            ProbeKind::Pit
        } else {
            ProbeKind::Food
        };
        let mut reading = ProbeReading::new(self.id, kind, self.tc);
        reading.name = non_empty(sanitize_name(&self.name));
        reading.blower = blower;
        reading.target = self.ta;
        reading
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
