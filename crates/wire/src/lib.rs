// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deskwire: realtime client plumbing for the helpdesk API.
//!
//! Two independent channels live here. The push connection ([`connection`])
//! multiplexes one WebSocket across every in-process subscriber and keeps it
//! alive with bounded reconnects. Job streams ([`stream`] and [`progress`])
//! read chunked event-stream responses for long-running scrape and index
//! jobs and fold them into progress state.

pub mod api;
pub mod channel;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod progress;
pub mod protocol;
pub mod selection;
pub mod store;
pub mod stream;


use std::sync::Once;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls. Only the first call
/// has an effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
