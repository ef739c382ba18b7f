// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Polling ingestion from the controller's JSON endpoint.
//!
//! One fetch runs immediately and then once per interval. A successful fetch replaces the whole
//! sensor and blower state; a failed one only bumps counters, leaving the last good state in
//! place.

use crate::constants::{DEFAULT_POLL_INTERVAL, FETCH_TIMEOUT};
use crate::errors::CollectError;
use crate::ingest::Ingestor;
use crate::payload::StatusDocument;
use crate::state::{IngestionMode, StateStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct PollerConfig {
    pub url: String,
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            interval: DEFAULT_POLL_INTERVAL,
            timeout: FETCH_TIMEOUT,
        }
    }
}

pub struct PollingIngestor {
    url: String,
    interval: Duration,
    client: reqwest::Client,
    store: Arc<StateStore>,
}

impl PollingIngestor {
    pub fn new(config: PollerConfig, store: Arc<StateStore>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            url: config.url,
            interval: config.interval,
            client,
            store,
        })
    }

    async fn fetch(&self) -> Result<StatusDocument, CollectError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(CollectError::Fetch)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollectError::HttpStatus(status));
        }
        response
            .json::<StatusDocument>()
            .await
            .map_err(CollectError::Decode)
    }

    /// Runs one collection cycle and applies its outcome to the store.
    pub async fn collect_once(&self) -> Result<(), CollectError> {
        self.store.record_attempt();
        let result = match self.fetch().await {
            Ok(document) => document.into_state().map_err(CollectError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(polled) => {
                let n_sensors = polled.sensors.len();
                let n_blowers = polled.blowers.len();
                for change in self.store.replace_all(polled.sensors, polled.blowers) {
                    warn!("{change}");
                }
                debug!("Collected {n_sensors} sensors and {n_blowers} blowers");
                Ok(())
            }
            Err(e) => {
                self.store.record_failed_attempt(e.category());
                error!("Failed to collect from {}: {}", self.url, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Ingestor for PollingIngestor {
    fn mode(&self) -> IngestionMode {
        IngestionMode::Polling
    }

    async fn run(&self, cancel_token: CancellationToken) {
        info!("Polling {} every {:?}", self.url, self.interval);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            // the first tick completes immediately
            tokio::select! {
                _ = ticker.tick() => {},
                _ = cancel_token.cancelled() => break,
            }
            // failures are already counted and logged
            let _ = self.collect_once().await;
        }
        debug!("Polling {} stopped", self.url);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::errors::FailureCategory;
    use crate::reading::ProbeKind;
    use crate::state::AttemptCounters;
    use mockito::Server;
    use tokio::time::timeout;

    const STATUS_PATH: &str = "/stoker.json";

    const FULL_DOCUMENT: &str = r#"{"stoker":{
        "sensors":[
            {"id":"2A0000110A314B30","name":"Pit","tc":107.2,"ta":110.0,"blower":"8D0000001B9F5F05"},
            {"id":"2B0000110A442730","name":"Brisket","tc":60.1,"blower":null},
            {"id":"0E0000110A4E5730","name":"Ribs","tc":71.8}
        ],
        "blowers":[{"id":"8D0000001B9F5F05","name":"Blower","on":1}]
    }}"#;

    const SMALL_DOCUMENT: &str = r#"{"stoker":{
        "sensors":[{"id":"2B0000110A442730","name":"Brisket","tc":63.0}],
        "blowers":[]
    }}"#;

    fn poller(server: &Server) -> (PollingIngestor, Arc<StateStore>) {
        let store = Arc::new(StateStore::new(IngestionMode::Polling));
        let config = PollerConfig {
            url: format!("{}{}", server.url(), STATUS_PATH),
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(2),
        };
        (
            PollingIngestor::new(config, Arc::clone(&store)).unwrap(),
            store,
        )
    }

    async fn serve(server: &mut Server, status: usize, body: &str) -> mockito::Mock {
        server
            .mock("GET", STATUS_PATH)
            .with_status(status)
            .with_header("Content-Type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_successful_fetch_replaces_state() {
        let mut server = Server::new_async().await;
        let (poller, store) = poller(&server);

        let full = serve(&mut server, 200, FULL_DOCUMENT).await;
        poller.collect_once().await.unwrap();
        full.assert_async().await;
        let snapshot = store.snapshot();
        assert_eq!(snapshot.probes.len(), 3);
        assert_eq!(snapshot.blowers.len(), 1);
        full.remove_async().await;

        let small = serve(&mut server, 200, SMALL_DOCUMENT).await;
        poller.collect_once().await.unwrap();
        small.assert_async().await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.probes.len(), 1);
        assert!(snapshot.blowers.is_empty());
        let brisket = snapshot.probe("2B0000110A442730").unwrap();
        assert_eq!(brisket.temperature, 63.0);
        assert_eq!(brisket.collection_count, 2);
        assert_eq!(
            snapshot.attempts,
            Some(AttemptCounters {
                total: 2,
                failed: 0
            })
        );
    }

    #[tokio::test]
    async fn test_sensor_assigned_a_blower_stays_exported() {
        let mut server = Server::new_async().await;
        let (poller, store) = poller(&server);

        let food = serve(&mut server, 200, SMALL_DOCUMENT).await;
        poller.collect_once().await.unwrap();
        food.remove_async().await;

        let _assigned = serve(
            &mut server,
            200,
            r#"{"stoker":{
                "sensors":[{"id":"2B0000110A442730","name":"Brisket","tc":64.0,"blower":"8D0000001B9F5F05"}],
                "blowers":[{"id":"8D0000001B9F5F05","name":"Blower","on":0}]
            }}"#,
        )
        .await;
        poller.collect_once().await.unwrap();
        poller.collect_once().await.unwrap();

        let snapshot = store.snapshot();
        let brisket = snapshot.probe("2B0000110A442730").unwrap();
        assert_eq!(brisket.kind, ProbeKind::Pit);
        assert_eq!(brisket.blower.as_deref(), Some("8D0000001B9F5F05"));
        assert_eq!(brisket.collection_count, 3);
        assert_eq!(snapshot.failures(FailureCategory::KindMismatch), 1);
        assert_eq!(snapshot.attempts.map(|a| a.failed), Some(0));
    }

    #[tokio::test]
    async fn test_empty_sensors_keep_previous_state() {
        let mut server = Server::new_async().await;
        let (poller, store) = poller(&server);

        let full = serve(&mut server, 200, FULL_DOCUMENT).await;
        poller.collect_once().await.unwrap();
        full.remove_async().await;
        let before = store.snapshot();

        let empty = serve(&mut server, 200, r#"{"stoker":{"sensors":[],"blowers":[]}}"#).await;
        let err = poller.collect_once().await.unwrap_err();
        empty.assert_async().await;
        assert_eq!(err.category(), FailureCategory::EmptyResult);

        let after = store.snapshot();
        assert_eq!(after.probes.len(), before.probes.len());
        for probe in &before.probes {
            assert_eq!(after.probe(&probe.id), Some(probe));
        }
        assert_eq!(after.blowers, before.blowers);
        assert_eq!(
            after.attempts,
            Some(AttemptCounters {
                total: 2,
                failed: 1
            })
        );
        assert_eq!(after.failures(FailureCategory::EmptyResult), 1);
    }

    #[tokio::test]
    async fn test_http_error_keeps_previous_state() {
        let mut server = Server::new_async().await;
        let (poller, store) = poller(&server);

        let full = serve(&mut server, 200, SMALL_DOCUMENT).await;
        poller.collect_once().await.unwrap();
        full.remove_async().await;

        let failing = serve(&mut server, 503, "unavailable").await;
        let err = poller.collect_once().await.unwrap_err();
        failing.assert_async().await;
        assert_eq!(err.category(), FailureCategory::HttpStatus);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.probes.len(), 1);
        assert_eq!(snapshot.failures(FailureCategory::HttpStatus), 1);
        assert_eq!(snapshot.attempts.map(|a| a.failed), Some(1));
    }

    #[tokio::test]
    async fn test_undecodable_payload() {
        let mut server = Server::new_async().await;
        let (poller, store) = poller(&server);

        let _garbage = serve(&mut server, 200, "{\"stoker\":").await;
        let err = poller.collect_once().await.unwrap_err();
        assert_eq!(err.category(), FailureCategory::Decode);
        assert!(store.snapshot().probes.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let store = Arc::new(StateStore::new(IngestionMode::Polling));
        let config = PollerConfig {
            url: "http://127.0.0.1:1/stoker.json".to_string(),
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(1),
        };
        let poller = PollingIngestor::new(config, Arc::clone(&store)).unwrap();

        let err = poller.collect_once().await.unwrap_err();
        assert_eq!(err.category(), FailureCategory::Fetch);
        assert_eq!(store.snapshot().failures(FailureCategory::Fetch), 1);
    }

    #[tokio::test]
    async fn test_run_collects_immediately_and_stops_on_cancel() {
        let mut server = Server::new_async().await;
        let (poller, store) = poller(&server);
        let _full = serve(&mut server, 200, FULL_DOCUMENT).await;

        let cancel_token = CancellationToken::new();
        let task = {
            let cancel_token = cancel_token.clone();
            tokio::spawn(async move { poller.run(cancel_token).await })
        };

        timeout(Duration::from_secs(5), async {
            while store.snapshot().attempts.map(|a| a.total).unwrap_or_default() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("poller should keep collecting");
        assert_eq!(store.snapshot().probes.len(), 3);

        cancel_token.cancel();
        timeout(Duration::from_secs(1), task)
            .await
            .expect("poller should stop after cancellation")
            .unwrap();
    }
}
