// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telemetry collection for Stoker BBQ controllers.
//!
//! The collector acquires readings from the controller either by following its streaming line
//! protocol or by polling its JSON endpoint, keeps the latest reading per probe and blower in a
//! shared [`state::StateStore`], and renders that state into Prometheus metrics on each scrape.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod errors;
pub mod exporter;
pub mod ingest;
pub mod parser;
pub mod payload;
pub mod poller;
pub mod reading;
pub mod server;
pub mod state;
pub mod streaming;
pub mod util;
