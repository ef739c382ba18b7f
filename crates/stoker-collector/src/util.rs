// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Utility functions shared by the parsers and the exporter.

use regex::Regex;
use std::sync::OnceLock;

fn invalid_name_chars() -> &'static Regex {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    let pattern = INVALID.get_or_init(|| Regex::new("[^a-z0-9_]").expect("static pattern is valid"));
    pattern
}

/// Normalizes a controller-assigned friendly name so it can be used as a label value.
///
/// The name is lowercased, each whitespace character becomes an underscore, and anything outside
/// `[a-z0-9_]` is dropped.
///
/// # Examples
///
/// ```
/// use stoker_collector::util::sanitize_name;
///
/// assert_eq!(sanitize_name("Pork Butt"), "pork_butt");
/// assert_eq!(sanitize_name("Pit #1"), "pit_1");
/// assert_eq!(sanitize_name("  "), "__");
/// ```
pub fn sanitize_name(name: &str) -> String {
    let lowered: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    invalid_name_chars().replace_all(&lowered, "").into_owned()
}

/// Converts a Celsius reading into Fahrenheit for presentation.
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}
