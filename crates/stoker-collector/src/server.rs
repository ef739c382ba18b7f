// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP endpoint serving the registry in the Prometheus text format.

use crate::constants::{HEALTH_PATH, METRICS_PATH};
use crate::errors::ServerError;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use prometheus::{Encoder, Registry, TextEncoder};
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct MetricsServer {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl MetricsServer {
    /// Binds the listener. Port 0 picks an ephemeral port, see [`MetricsServer::local_addr`].
    pub async fn bind(addr: SocketAddr, registry: Arc<Registry>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `cancel_token` fires.
    pub async fn serve(self, cancel_token: CancellationToken) -> Result<(), ServerError> {
        if let Ok(addr) = self.local_addr() {
            info!("Serving metrics on http://{addr}{METRICS_PATH}");
        }
        let registry = self.registry;
        let service = service_fn(move |req| {
            let registry = Arc::clone(&registry);
            async move { Ok::<_, Infallible>(Self::handle(&registry, &req)) }
        });

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                con_res = self.listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(ServerError::Accept(e));
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
                _ = cancel_token.cancelled() => {
                    debug!("Metrics server shutting down");
                    joinset.abort_all();
                    return Ok(());
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Connection error: {e}");
                }
            });
        }
    }

    fn handle(registry: &Registry, req: &Request<Incoming>) -> Response<Full<Bytes>> {
        let response = match (req.method(), req.uri().path()) {
            (&Method::GET, METRICS_PATH) => Self::render_metrics(registry),
            (&Method::GET, HEALTH_PATH) => text_response(StatusCode::OK, "ok"),
            _ => text_response(StatusCode::NOT_FOUND, "not found"),
        };
        response.unwrap_or_else(|e| {
            error!("Failed to build response: {e}");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }

    fn render_metrics(registry: &Registry) -> http::Result<Response<Full<Bytes>>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {e}");
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics");
        }
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, encoder.format_type())
            .body(Full::new(Bytes::from(buffer)))
    }
}

fn text_response(status: StatusCode, body: &'static str) -> http::Result<Response<Full<Bytes>>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
}
