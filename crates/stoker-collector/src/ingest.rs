// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::state::IngestionMode;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A background loop that acquires readings from the controller and feeds the state store.
///
/// Implementations never return on transient failures; they run until `cancel_token` fires.
#[async_trait]
pub trait Ingestor: Send + Sync {
    fn mode(&self) -> IngestionMode;

    async fn run(&self, cancel_token: CancellationToken);
}

/// Sleeps for `duration` unless cancelled first. Returns false when cancelled.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel_token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel_token.cancelled() => false,
    }
}
