// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Streaming ingestion from the controller's telnet port.
//!
//! The controller pushes newline-delimited records over a plain TCP connection. Any dial or read
//! failure is counted, followed by a fixed backoff and a reconnect. The loop only stops when its
//! cancellation token fires. Lines longer than [`MAX_LINE_LENGTH`] are never buffered whole: they
//! are counted as read failures and skipped.

use crate::constants::{CONNECT_TIMEOUT, MAX_LINE_LENGTH, RECONNECT_BACKOFF};
use crate::errors::FailureCategory;
use crate::ingest::{sleep_or_cancel, Ingestor};
use crate::parser::{parse_line, LineRecord};
use crate::state::{IngestionMode, StateStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

// Device lines are well under this; it only sizes the read buffer
const READ_BUFFER_SIZE: usize = 1024;

pub struct StreamingConfig {
    /// `host:port` of the controller's line stream
    pub addr: String,
    pub connect_timeout: Duration,
    pub reconnect_backoff: Duration,
}

impl StreamingConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: CONNECT_TIMEOUT,
            reconnect_backoff: RECONNECT_BACKOFF,
        }
    }
}

/// Outcome of one bounded line read.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    /// `buf` holds a line, possibly without its newline if the stream ended after it
    Line,
    /// The line exceeded [`MAX_LINE_LENGTH`] and was skipped
    TooLong,
    Eof,
}

/// Reads the next line into `buf`, never holding more than [`MAX_LINE_LENGTH`] bytes of it.
async fn read_line_bounded<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if read == MAX_LINE_LENGTH && buf.last() != Some(&b'\n') {
        buf.clear();
        skip_line(reader).await?;
        return Ok(LineRead::TooLong);
    }
    Ok(LineRead::Line)
}

/// Drops bytes up to and including the next newline without buffering them.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        let newline = available.iter().position(|b| *b == b'\n');
        let len = available.len();
        match newline {
            Some(i) => {
                reader.consume(i + 1);
                return Ok(());
            }
            None => reader.consume(len),
        }
    }
}

/// Why a connection's read loop ended.
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    Cancelled,
    Failed,
}

pub struct StreamingIngestor {
    config: StreamingConfig,
    store: Arc<StateStore>,
}

impl StreamingIngestor {
    #[must_use]
    pub fn new(config: StreamingConfig, store: Arc<StateStore>) -> Self {
        Self { config, store }
    }

    async fn connect(&self) -> std::io::Result<TcpStream> {
        match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(&self.config.addr),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            )),
        }
    }

    /// Reads records until the stream fails, ends, or the token is cancelled.
    async fn consume<R>(&self, reader: &mut R, cancel_token: &CancellationToken) -> StreamEnd
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::with_capacity(READ_BUFFER_SIZE);
        loop {
            if cancel_token.is_cancelled() {
                return StreamEnd::Cancelled;
            }
            let read = tokio::select! {
                result = read_line_bounded(reader, &mut buf) => result,
                _ = cancel_token.cancelled() => return StreamEnd::Cancelled,
            };
            match read {
                Ok(LineRead::Eof) => {
                    self.store.record_failure(FailureCategory::ReadLine);
                    warn!("Stream from {} closed by peer", self.config.addr);
                    return StreamEnd::Failed;
                }
                Ok(LineRead::TooLong) => {
                    self.store.record_failure(FailureCategory::ReadLine);
                    warn!(
                        "Skipped line from {} longer than {} bytes",
                        self.config.addr, MAX_LINE_LENGTH
                    );
                }
                Ok(LineRead::Line) => self.ingest_line(&String::from_utf8_lossy(&buf)),
                Err(e) => {
                    self.store.record_failure(FailureCategory::ReadLine);
                    warn!("Failed to read from {}: {}", self.config.addr, e);
                    return StreamEnd::Failed;
                }
            }
        }
    }

    /// Parses one raw line and applies it to the store.
    pub fn ingest_line(&self, line: &str) {
        match parse_line(line) {
            Ok(LineRecord::Probe(reading)) => {
                let id = reading.id.clone();
                let recorded = self.store.record_reading(reading);
                if let Some(change) = recorded.kind_change {
                    warn!("{change}");
                }
                trace!(
                    "Updated probe {id} ({} collections)",
                    recorded.collection_count
                );
            }
            Ok(LineRecord::Ignored) => trace!("Ignoring non-probe line: {}", line.trim_end()),
            Err(e) => {
                self.store.record_failure(e.category());
                debug!("Failed to parse line {:?}: {}", line.trim_end(), e);
            }
        }
    }
}

#[async_trait]
impl Ingestor for StreamingIngestor {
    fn mode(&self) -> IngestionMode {
        IngestionMode::Streaming
    }

    async fn run(&self, cancel_token: CancellationToken) {
        info!("Streaming readings from {}", self.config.addr);
        while !cancel_token.is_cancelled() {
            let connected = tokio::select! {
                result = self.connect() => result,
                _ = cancel_token.cancelled() => break,
            };
            match connected {
                Ok(stream) => {
                    debug!("Connected to {}", self.config.addr);
                    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, stream);
                    if self.consume(&mut reader, &cancel_token).await == StreamEnd::Cancelled {
                        break;
                    }
                }
                Err(e) => {
                    self.store.record_failure(FailureCategory::Dial);
                    warn!("Failed to connect to {}: {}", self.config.addr, e);
                }
            }
            if !sleep_or_cancel(self.config.reconnect_backoff, &cancel_token).await {
                break;
            }
        }
        debug!("Streaming ingestion from {} stopped", self.config.addr);
    }
}
