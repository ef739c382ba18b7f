// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use stoker_collector::{
    config::{Config, Source},
    exporter::StokerCollector,
    ingest::Ingestor,
    poller::{PollerConfig, PollingIngestor},
    server::MetricsServer,
    state::{IngestionMode, StateStore},
    streaming::{StreamingConfig, StreamingIngestor},
};

#[tokio::main]
pub async fn main() {
    let config = Config::from_env();
    let log_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    let env_filter = format!("h2=off,hyper=off,reqwest=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration, shutting down: {e}");
            return;
        }
    };

    let mode = match config.source {
        Source::Stream { .. } => IngestionMode::Streaming,
        Source::Poll { .. } => IngestionMode::Polling,
    };
    let store = Arc::new(StateStore::new(mode));

    let ingestor: Box<dyn Ingestor> = match &config.source {
        Source::Stream { addr } => Box::new(StreamingIngestor::new(
            StreamingConfig::new(addr.clone()),
            Arc::clone(&store),
        )),
        Source::Poll { url, interval } => {
            let poller_config = PollerConfig {
                interval: *interval,
                ..PollerConfig::new(url.clone())
            };
            match PollingIngestor::new(poller_config, Arc::clone(&store)) {
                Ok(poller) => Box::new(poller),
                Err(e) => {
                    error!("Failed to create HTTP client: {e}");
                    return;
                }
            }
        }
    };

    let registry = match build_registry(store, &config) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Failed to register collector: {e}");
            return;
        }
    };

    #[allow(clippy::expect_used)]
    let server = MetricsServer::bind(config.listen_addr, registry)
        .await
        .expect("failed to bind metrics listener");

    let cancel_token = CancellationToken::new();

    info!("Starting {:?} ingestion", ingestor.mode());
    let ingest_token = cancel_token.clone();
    let ingest_handle = tokio::spawn(async move {
        ingestor.run(ingest_token).await;
    });

    let server_token = cancel_token.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.serve(server_token).await {
            error!("Metrics server stopped: {e}");
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!("Failed to listen for shutdown signal: {e}"),
    }
    cancel_token.cancel();

    if let Err(e) = ingest_handle.await {
        error!("Ingestion task failed: {e}");
    }
    if let Err(e) = server_handle.await {
        error!("Metrics server task failed: {e}");
    }
    info!("Shut down");
}

fn build_registry(
    store: Arc<StateStore>,
    config: &Config,
) -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();
    let collector = StokerCollector::new(store, config.temperature_unit)?;
    registry.register(Box::new(collector))?;
    Ok(registry)
}
