// Copyright 2026 Shelfwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shelfwatch library — recurring product-price scrape-orchestration
//! pipeline.
//!
//! This library crate exposes the core modules for integration testing.

pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod directory;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod period;
pub mod progress;
pub mod renderer;
pub mod retrieval;
pub mod scheduler;
pub mod sink;
pub mod validate;
