// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Default port of the controller's telnet stream
pub const DEFAULT_STREAM_PORT: u16 = 23;

/// Default address the metrics endpoint listens on
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9776";

/// Fixed wait between streaming reconnect attempts
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound on establishing the streaming connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest streamed line kept in memory. Longer lines are discarded up to the next newline.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Upper bound on a single JSON fetch
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Number of value fields following the identifier in a food probe record
pub const FOOD_FIELD_COUNT: usize = 9;

/// Index (into the value fields) of the temperature
pub const TEMPERATURE_FIELD: usize = 8;

/// Index (into the value fields) of the extended record marker
pub const MARKER_FIELD: usize = 9;

pub const PID_MARKER: &str = "PID:";

/// Blower reference used when the controller does not say which blower drives a pit probe
pub const UNKNOWN_BLOWER: &str = "unknown";

pub const METRICS_PATH: &str = "/metrics";
pub const HEALTH_PATH: &str = "/health";
