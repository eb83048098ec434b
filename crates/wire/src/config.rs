// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by the push connection and job streams.
#[derive(Debug, Clone, clap::Args)]
pub struct WireConfig {
    /// Base URL of the helpdesk API (the push URL is derived from it).
    #[arg(long, default_value = "http://localhost:8080/v1", env = "DESKWIRE_API_URL")]
    pub api_url: String,

    /// JSON key-value file holding session identifiers (auth_token, tenant_id, ...).
    #[arg(long, env = "DESKWIRE_STORE")]
    pub store: Option<PathBuf>,

    /// Base reconnect delay in milliseconds.
    #[arg(long, default_value_t = 1000, env = "DESKWIRE_RECONNECT_BASE_MS")]
    pub reconnect_base_ms: u64,

    /// Upper bound on the reconnect delay in milliseconds.
    #[arg(long, default_value_t = 30000, env = "DESKWIRE_RECONNECT_CAP_MS")]
    pub reconnect_cap_ms: u64,

    /// Reconnect attempts before the connection is declared failed.
    #[arg(long, default_value_t = 5, env = "DESKWIRE_MAX_RECONNECT_ATTEMPTS")]
    pub max_reconnect_attempts: u32,

    /// Liveness probe interval in milliseconds.
    #[arg(
        long,
        default_value_t = 30000,
        env = "DESKWIRE_PING_INTERVAL_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub ping_interval_ms: u64,

    /// Delay before a manual retry reconnects, in milliseconds.
    #[arg(long, default_value_t = 500, env = "DESKWIRE_MANUAL_RETRY_DELAY_MS")]
    pub manual_retry_delay_ms: u64,

    /// Timeout for plain REST requests in milliseconds (job streams are unbounded).
    #[arg(long, default_value_t = 10000, env = "DESKWIRE_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/v1".to_owned(),
            store: None,
            reconnect_base_ms: 1000,
            reconnect_cap_ms: 30000,
            max_reconnect_attempts: 5,
            ping_interval_ms: 30000,
            manual_retry_delay_ms: 500,
            request_timeout_ms: 10000,
        }
    }
}

impl WireConfig {
    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_cap(&self) -> Duration {
        Duration::from_millis(self.reconnect_cap_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn manual_retry_delay(&self) -> Duration {
        Duration::from_millis(self.manual_retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// API base without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// Push-channel base URL: the API base with `http(s)` swapped for `ws(s)`.
    pub fn ws_base(&self) -> String {
        let base = self.api_base();
        if base.starts_with("https://") {
            base.replacen("https://", "wss://", 1)
        } else {
            base.replacen("http://", "ws://", 1)
        }
    }
}
