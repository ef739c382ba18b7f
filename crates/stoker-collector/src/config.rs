// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven configuration.

use crate::constants::{DEFAULT_LISTEN_ADDR, DEFAULT_POLL_INTERVAL, DEFAULT_STREAM_PORT};
use crate::errors::ConfigError;
use crate::exporter::TemperatureUnit;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const ENV_ADDR: &str = "STOKER_ADDR";
const ENV_URL: &str = "STOKER_URL";
const ENV_LISTEN_ADDR: &str = "STOKER_LISTEN_ADDR";
const ENV_POLL_INTERVAL: &str = "STOKER_POLL_INTERVAL_SECS";
const ENV_TEMPERATURE_UNIT: &str = "STOKER_TEMPERATURE_UNIT";
const ENV_LOG_LEVEL: &str = "STOKER_LOG_LEVEL";

/// Where readings come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `host:port` of the telnet line stream
    Stream { addr: String },
    /// JSON status endpoint, fetched every `interval`
    Poll { url: String, interval: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub source: Source,
    pub listen_addr: SocketAddr,
    pub temperature_unit: TemperatureUnit,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let source = match (get(ENV_ADDR), get(ENV_URL)) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingSources),
            (None, None) => return Err(ConfigError::MissingSource),
            (Some(addr), None) => Source::Stream {
                addr: with_default_port(addr),
            },
            (None, Some(url)) => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_URL,
                        value: url,
                        reason: "expected an http:// or https:// URL".to_string(),
                    });
                }
                let interval = match get(ENV_POLL_INTERVAL) {
                    Some(raw) => match raw.parse::<u64>() {
                        Ok(secs) if secs > 0 => Duration::from_secs(secs),
                        _ => {
                            return Err(ConfigError::InvalidValue {
                                key: ENV_POLL_INTERVAL,
                                value: raw,
                                reason: "expected a positive number of seconds".to_string(),
                            })
                        }
                    },
                    None => DEFAULT_POLL_INTERVAL,
                };
                Source::Poll { url, interval }
            }
        };

        let raw_listen = get(ENV_LISTEN_ADDR).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = raw_listen
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: ENV_LISTEN_ADDR,
                value: raw_listen.clone(),
                reason: e.to_string(),
            })?;

        let temperature_unit = match get(ENV_TEMPERATURE_UNIT) {
            Some(raw) => raw
                .parse::<TemperatureUnit>()
                .map_err(|reason| ConfigError::InvalidValue {
                    key: ENV_TEMPERATURE_UNIT,
                    value: raw,
                    reason,
                })?,
            None => TemperatureUnit::default(),
        };

        let log_level = get(ENV_LOG_LEVEL)
            .map(|v| v.to_lowercase())
            .unwrap_or_else(|| "info".to_string());

        Ok(Config {
            source,
            listen_addr,
            temperature_unit,
            log_level,
        })
    }
}

/// Appends the controller's telnet port when `addr` has none.
fn with_default_port(addr: String) -> String {
    if addr.parse::<SocketAddr>().is_ok() {
        return addr;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => addr,
        _ if addr.contains(':') && !addr.starts_with('[') => format!("[{addr}]:{DEFAULT_STREAM_PORT}"),
        _ => format!("{addr}:{DEFAULT_STREAM_PORT}"),
    }
}
