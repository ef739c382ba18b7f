// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Renders state store snapshots into metric records.
//!
//! [`export`] turns one [`Snapshot`] into flat [`MetricRecord`]s. [`StokerCollector`] adapts that
//! to a Prometheus [`Collector`]: every scrape copies the store once, releases the lock, and then
//! builds the metric families.

use crate::reading::ProbeKind;
use crate::state::{Snapshot, StateStore};
use crate::util::celsius_to_fahrenheit;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, IntCounterVec, Opts};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// Static description of one exported metric family.
#[derive(Debug, PartialEq)]
pub struct Family {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

pub const TEMPERATURE_CELSIUS: Family = Family {
    name: "stoker_temperature_celsius",
    help: "Current probe temperature in degrees Celsius.",
    kind: MetricKind::Gauge,
    labels: &["id", "type", "name", "blower"],
};

pub const TEMPERATURE_FAHRENHEIT: Family = Family {
    name: "stoker_temperature_fahrenheit",
    help: "Current probe temperature in degrees Fahrenheit.",
    kind: MetricKind::Gauge,
    labels: &["id", "type", "name", "blower"],
};

pub const TARGET_CELSIUS: Family = Family {
    name: "stoker_target_temperature_celsius",
    help: "Target temperature set on the controller in degrees Celsius.",
    kind: MetricKind::Gauge,
    labels: &["id", "type", "name"],
};

pub const TARGET_FAHRENHEIT: Family = Family {
    name: "stoker_target_temperature_fahrenheit",
    help: "Target temperature set on the controller in degrees Fahrenheit.",
    kind: MetricKind::Gauge,
    labels: &["id", "type", "name"],
};

pub const PROBE_COLLECTIONS: Family = Family {
    name: "stoker_probe_collections_total",
    help: "Number of successful updates of a probe.",
    kind: MetricKind::Counter,
    labels: &["id", "type"],
};

pub const PROBE_LAST_UPDATE: Family = Family {
    name: "stoker_probe_last_update_timestamp_seconds",
    help: "UNIX time of the last successful update of a probe.",
    kind: MetricKind::Gauge,
    labels: &["id", "type"],
};

pub const BLOWER_ON: Family = Family {
    name: "stoker_blower_on",
    help: "Whether the blower is running (1) or not (0).",
    kind: MetricKind::Gauge,
    labels: &["id", "name"],
};

pub const FAILURES: Family = Family {
    name: "stoker_failures_total",
    help: "Collection failures by category.",
    kind: MetricKind::Counter,
    labels: &["category"],
};

pub const COLLECTIONS: Family = Family {
    name: "stoker_collections_total",
    help: "Number of polling attempts.",
    kind: MetricKind::Counter,
    labels: &[],
};

pub const COLLECTION_FAILURES: Family = Family {
    name: "stoker_collection_failures_total",
    help: "Number of failed polling attempts.",
    kind: MetricKind::Counter,
    labels: &[],
};

const ALL_FAMILIES: [&Family; 10] = [
    &TEMPERATURE_CELSIUS,
    &TEMPERATURE_FAHRENHEIT,
    &TARGET_CELSIUS,
    &TARGET_FAHRENHEIT,
    &PROBE_COLLECTIONS,
    &PROBE_LAST_UPDATE,
    &BLOWER_ON,
    &FAILURES,
    &COLLECTIONS,
    &COLLECTION_FAILURES,
];

/// Unit temperatures are presented in. Storage is always Celsius.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    fn convert(&self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius_to_fahrenheit(celsius),
        }
    }

    fn temperature_family(&self) -> &'static Family {
        match self {
            Self::Celsius => &TEMPERATURE_CELSIUS,
            Self::Fahrenheit => &TEMPERATURE_FAHRENHEIT,
        }
    }

    fn target_family(&self) -> &'static Family {
        match self {
            Self::Celsius => &TARGET_CELSIUS,
            Self::Fahrenheit => &TARGET_FAHRENHEIT,
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "c" | "celsius" => Ok(Self::Celsius),
            "f" | "fahrenheit" => Ok(Self::Fahrenheit),
            other => Err(format!("unknown temperature unit {other:?}")),
        }
    }
}

/// Sample value. Counters stay integral from the store to the encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(u64),
}

impl MetricValue {
    fn kind(self) -> MetricKind {
        match self {
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Counter(_) => MetricKind::Counter,
        }
    }
}

/// One immutable metric value with its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub family: &'static Family,
    pub label_values: Vec<String>,
    pub value: MetricValue,
}

impl MetricRecord {
    fn new(family: &'static Family, label_values: Vec<String>, value: MetricValue) -> Self {
        Self {
            family,
            label_values,
            value,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.label_values.len() != self.family.labels.len() {
            return Err(format!(
                "expected {} label values, got {}",
                self.family.labels.len(),
                self.label_values.len()
            ));
        }
        if let Some(i) = self.label_values.iter().position(String::is_empty) {
            return Err(format!("empty value for label {:?}", self.family.labels[i]));
        }
        if self.value.kind() != self.family.kind {
            return Err(format!("{:?} value for a {:?} family", self.value, self.family.kind));
        }
        match self.value {
            MetricValue::Gauge(v) if !v.is_finite() => Err(format!("non-finite value {v}")),
            _ => Ok(()),
        }
    }
}

fn or_unknown(value: Option<&str>) -> String {
    value.unwrap_or("unknown").to_string()
}

/// Renders one snapshot into metric records.
///
/// Records with malformed label data are logged and left out; everything else is returned.
pub fn export(snapshot: &Snapshot, unit: TemperatureUnit) -> Vec<MetricRecord> {
    let mut records = Vec::with_capacity(snapshot.probes.len() * 4 + snapshot.blowers.len() + 8);

    for probe in &snapshot.probes {
        let kind = probe.kind.as_str().to_string();
        let name = or_unknown(probe.name.as_deref());
        let blower = match probe.kind {
            ProbeKind::Pit => or_unknown(probe.blower.as_deref()),
            ProbeKind::Food | ProbeKind::Unknown => "none".to_string(),
        };
        records.push(MetricRecord::new(
            unit.temperature_family(),
            vec![probe.id.clone(), kind.clone(), name.clone(), blower],
            MetricValue::Gauge(unit.convert(probe.temperature)),
        ));
        if let Some(target) = probe.target {
            records.push(MetricRecord::new(
                unit.target_family(),
                vec![probe.id.clone(), kind.clone(), name],
                MetricValue::Gauge(unit.convert(target)),
            ));
        }
        records.push(MetricRecord::new(
            &PROBE_COLLECTIONS,
            vec![probe.id.clone(), kind.clone()],
            MetricValue::Counter(probe.collection_count),
        ));
        records.push(MetricRecord::new(
            &PROBE_LAST_UPDATE,
            vec![probe.id.clone(), kind],
            MetricValue::Gauge(probe.last_updated),
        ));
        // streaming pit records report blower state without saying which blower it is
        if let Some(on) = probe.pid.as_ref().and_then(|pid| pid.blower_on) {
            records.push(MetricRecord::new(
                &BLOWER_ON,
                vec![format!("{}_blower", probe.id), or_unknown(probe.blower.as_deref())],
                MetricValue::Gauge(if on { 1.0 } else { 0.0 }),
            ));
        }
    }

    for blower in &snapshot.blowers {
        records.push(MetricRecord::new(
            &BLOWER_ON,
            vec![blower.id.clone(), or_unknown(blower.name.as_deref())],
            MetricValue::Gauge(if blower.on { 1.0 } else { 0.0 }),
        ));
    }

    for (category, count) in &snapshot.failures {
        records.push(MetricRecord::new(
            &FAILURES,
            vec![category.as_str().to_string()],
            MetricValue::Counter(*count),
        ));
    }

    if let Some(attempts) = snapshot.attempts {
        records.push(MetricRecord::new(
            &COLLECTIONS,
            vec![],
            MetricValue::Counter(attempts.total),
        ));
        records.push(MetricRecord::new(
            &COLLECTION_FAILURES,
            vec![],
            MetricValue::Counter(attempts.failed),
        ));
    }

    records.retain(|record| match record.validate() {
        Ok(()) => true,
        Err(reason) => {
            warn!(
                "Skipping {} {:?}: {}",
                record.family.name, record.label_values, reason
            );
            false
        }
    });
    records
}

/// Prometheus collector over a shared [`StateStore`].
///
/// Constructed once at startup and registered on an explicit registry handed to the HTTP server.
pub struct StokerCollector {
    store: Arc<StateStore>,
    unit: TemperatureUnit,
    descs: Vec<Desc>,
}

impl StokerCollector {
    pub fn new(store: Arc<StateStore>, unit: TemperatureUnit) -> prometheus::Result<Self> {
        let descs = ALL_FAMILIES
            .iter()
            .map(|family| {
                Desc::new(
                    family.name.to_string(),
                    family.help.to_string(),
                    family.labels.iter().map(|l| (*l).to_string()).collect(),
                    HashMap::new(),
                )
            })
            .collect::<prometheus::Result<Vec<_>>>()?;
        Ok(Self { store, unit, descs })
    }
}

/// Builds the metric families for a batch of records, grouped by family in first-seen order.
fn encode(records: &[MetricRecord]) -> Vec<MetricFamily> {
    let mut order: Vec<&'static Family> = Vec::new();
    let mut grouped: HashMap<&'static str, Vec<&MetricRecord>> = HashMap::new();
    for record in records {
        let entry = grouped.entry(record.family.name).or_default();
        if entry.is_empty() {
            order.push(record.family);
        }
        entry.push(record);
    }

    let mut families = Vec::with_capacity(order.len());
    for family in order {
        let members = grouped.remove(family.name).unwrap_or_default();
        match encode_family(family, &members) {
            Ok(mut encoded) => families.append(&mut encoded),
            Err(e) => error!("Failed to encode {}: {}", family.name, e),
        }
    }
    families
}

fn encode_family(
    family: &'static Family,
    records: &[&MetricRecord],
) -> prometheus::Result<Vec<MetricFamily>> {
    let opts = Opts::new(family.name, family.help);
    match family.kind {
        MetricKind::Gauge => {
            let vec = GaugeVec::new(opts, family.labels)?;
            for record in records {
                let values: Vec<&str> = record.label_values.iter().map(String::as_str).collect();
                let MetricValue::Gauge(value) = record.value else {
                    continue;
                };
                match vec.get_metric_with_label_values(&values) {
                    Ok(gauge) => gauge.set(value),
                    Err(e) => warn!("Skipping {} {:?}: {}", family.name, values, e),
                }
            }
            Ok(vec.collect())
        }
        MetricKind::Counter => {
            let vec = IntCounterVec::new(opts, family.labels)?;
            for record in records {
                let values: Vec<&str> = record.label_values.iter().map(String::as_str).collect();
                let MetricValue::Counter(value) = record.value else {
                    continue;
                };
                match vec.get_metric_with_label_values(&values) {
                    Ok(counter) => counter.inc_by(value),
                    Err(e) => warn!("Skipping {} {:?}: {}", family.name, values, e),
                }
            }
            Ok(vec.collect())
        }
    }
}

impl Collector for StokerCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let snapshot = self.store.snapshot();
        encode(&export(&snapshot, self.unit))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::errors::FailureCategory;
    use crate::reading::{BlowerReading, PidState, ProbeReading};
    use crate::state::{AttemptCounters, BlowerState, IngestionMode, ProbeState};
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::collections::BTreeMap;
    use tracing_test::traced_test;

    fn probe(id: &str, kind: ProbeKind, temperature: f64) -> ProbeState {
        ProbeState {
            id: id.to_string(),
            kind,
            temperature,
            name: None,
            blower: None,
            target: None,
            pid: None,
            collection_count: 1,
            last_updated: 1_700_000_000.0,
        }
    }

    fn empty_snapshot() -> Snapshot {
        Snapshot {
            probes: vec![],
            blowers: vec![],
            failures: BTreeMap::new(),
            attempts: None,
        }
    }

    fn find<'a>(records: &'a [MetricRecord], family: &Family, id: &str) -> Option<&'a MetricRecord> {
        records
            .iter()
            .find(|r| r.family == family && r.label_values.first().map(String::as_str) == Some(id))
    }

    fn render(registry: &Registry) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_export_empty_snapshot() {
        assert!(export(&empty_snapshot(), TemperatureUnit::Celsius).is_empty());
    }

    #[test]
    fn test_export_probes() {
        let mut pit = probe("2A0000110A314B30", ProbeKind::Pit, 107.2);
        pit.blower = Some("unknown".to_string());
        pit.target = Some(110.0);
        pit.collection_count = 7;
        let mut snapshot = empty_snapshot();
        snapshot.probes = vec![probe("2B0000110A442730", ProbeKind::Food, 32.4), pit];

        let records = export(&snapshot, TemperatureUnit::Celsius);

        let food = find(&records, &TEMPERATURE_CELSIUS, "2B0000110A442730").unwrap();
        assert_eq!(food.label_values, vec!["2B0000110A442730", "food", "unknown", "none"]);
        assert_eq!(food.value, MetricValue::Gauge(32.4));

        let pit = find(&records, &TEMPERATURE_CELSIUS, "2A0000110A314B30").unwrap();
        assert_eq!(pit.label_values[1], "pit");
        assert_eq!(pit.label_values[3], "unknown");
        assert_eq!(
            find(&records, &PROBE_COLLECTIONS, "2A0000110A314B30").map(|r| r.value),
            Some(MetricValue::Counter(7))
        );
        assert_eq!(
            find(&records, &TARGET_CELSIUS, "2A0000110A314B30").map(|r| r.value),
            Some(MetricValue::Gauge(110.0))
        );
        assert!(find(&records, &TARGET_CELSIUS, "2B0000110A442730").is_none());
        assert!(records.iter().all(|r| r.family != &COLLECTIONS));
    }

    #[test]
    fn test_export_fahrenheit() {
        let mut snapshot = empty_snapshot();
        snapshot.probes = vec![probe("p1", ProbeKind::Food, 100.0)];

        let records = export(&snapshot, TemperatureUnit::Fahrenheit);
        assert_eq!(
            find(&records, &TEMPERATURE_FAHRENHEIT, "p1").map(|r| r.value),
            Some(MetricValue::Gauge(212.0))
        );
        assert!(find(&records, &TEMPERATURE_CELSIUS, "p1").is_none());
    }

    #[test]
    fn test_export_counters_and_blowers() {
        let mut snapshot = empty_snapshot();
        snapshot.blowers = vec![BlowerState {
            id: "b1".to_string(),
            name: Some("blower_1".to_string()),
            on: true,
        }];
        snapshot.failures.insert(FailureCategory::HttpStatus, 2);
        snapshot.attempts = Some(AttemptCounters {
            total: 5,
            failed: 2,
        });

        let records = export(&snapshot, TemperatureUnit::Celsius);
        assert_eq!(
            find(&records, &BLOWER_ON, "b1").map(|r| r.value),
            Some(MetricValue::Gauge(1.0))
        );
        assert_eq!(
            find(&records, &FAILURES, "httpStatus").map(|r| r.value),
            Some(MetricValue::Counter(2))
        );
        let collections = records.iter().find(|r| r.family == &COLLECTIONS).unwrap();
        assert_eq!(collections.value, MetricValue::Counter(5));
        let failed = records
            .iter()
            .find(|r| r.family == &COLLECTION_FAILURES)
            .unwrap();
        assert_eq!(failed.value, MetricValue::Counter(2));
    }

    #[test]
    fn test_export_keeps_large_counts_exact() {
        let count = (1u64 << 53) + 1;
        let mut snapshot = empty_snapshot();
        snapshot.failures.insert(FailureCategory::Dial, count);

        let records = export(&snapshot, TemperatureUnit::Celsius);
        assert_eq!(
            find(&records, &FAILURES, "dial").map(|r| r.value),
            Some(MetricValue::Counter(count))
        );
    }

    #[test]
    fn test_mismatched_value_kind_is_invalid() {
        let record = MetricRecord::new(&COLLECTIONS, vec![], MetricValue::Gauge(1.0));
        assert!(record.validate().is_err());
        let record = MetricRecord::new(&COLLECTIONS, vec![], MetricValue::Counter(1));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_export_streaming_blower_state() {
        let mut pit = probe("p1", ProbeKind::Pit, 120.0);
        pit.blower = Some("unknown".to_string());
        pit.pid = Some(PidState {
            blower_on: Some(false),
            ..PidState::default()
        });
        let mut snapshot = empty_snapshot();
        snapshot.probes = vec![pit];

        let records = export(&snapshot, TemperatureUnit::Celsius);
        let blower = find(&records, &BLOWER_ON, "p1_blower").unwrap();
        assert_eq!(blower.label_values[1], "unknown");
        assert_eq!(blower.value, MetricValue::Gauge(0.0));
    }

    #[test]
    #[traced_test]
    fn test_export_skips_malformed_record() {
        let mut snapshot = empty_snapshot();
        snapshot.probes = vec![
            probe("", ProbeKind::Food, 20.0),
            probe("p2", ProbeKind::Food, 21.0),
        ];

        let records = export(&snapshot, TemperatureUnit::Celsius);
        assert!(records
            .iter()
            .all(|r| r.label_values.iter().all(|v| !v.is_empty())));
        assert_eq!(
            find(&records, &TEMPERATURE_CELSIUS, "p2").map(|r| r.value),
            Some(MetricValue::Gauge(21.0))
        );
        assert!(logs_contain("Skipping stoker_temperature_celsius"));
    }

    #[test]
    fn test_collector_renders_text_format() {
        let store = Arc::new(StateStore::new(IngestionMode::Polling));
        let mut pit = ProbeReading::new("2A0000110A314B30", ProbeKind::Pit, 107.2);
        pit.name = Some("pit".to_string());
        pit.blower = Some("b1".to_string());
        store.record_attempt();
        store.replace_all(
            vec![pit, ProbeReading::new("2B0000110A442730", ProbeKind::Food, 32.4)],
            vec![BlowerReading {
                id: "b1".to_string(),
                name: Some("blower".to_string()),
                on: true,
            }],
        );

        let registry = Registry::new();
        let collector = StokerCollector::new(store, TemperatureUnit::Celsius).unwrap();
        registry.register(Box::new(collector)).unwrap();

        let text = render(&registry);
        assert!(text.contains("# TYPE stoker_temperature_celsius gauge"));
        assert!(text.contains(
            "stoker_temperature_celsius{blower=\"b1\",id=\"2A0000110A314B30\",name=\"pit\",type=\"pit\"} 107.2"
        ));
        assert!(text.contains(
            "stoker_probe_collections_total{id=\"2B0000110A442730\",type=\"food\"} 1"
        ));
        assert!(text.contains("stoker_blower_on{id=\"b1\",name=\"blower\"} 1"));
        assert!(text.contains("stoker_collections_total 1"));
        assert!(text.contains("stoker_collection_failures_total 0"));
    }

    #[test]
    fn test_collector_renders_empty_store() {
        let store = Arc::new(StateStore::new(IngestionMode::Streaming));
        let registry = Registry::new();
        registry
            .register(Box::new(
                StokerCollector::new(store, TemperatureUnit::Celsius).unwrap(),
            ))
            .unwrap();
        assert_eq!(render(&registry), "");
    }
}
