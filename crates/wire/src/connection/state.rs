// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;

use crate::protocol::EventCategory;

/// Lifecycle of the single push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for, or performing, reconnect number `attempt`.
    Reconnecting { attempt: u32 },
    /// Attempt ceiling reached; only a manual retry resumes.
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

/// Most recent application event seen on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LastEvent {
    pub category: EventCategory,
    pub at_ms: u64,
}

/// Point-in-time view of the connection handed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    /// Liveness replies never appear here.
    pub last_event: Option<LastEvent>,
}

impl ConnectionSnapshot {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt_count: 0,
            max_attempts,
            last_error: None,
            last_event: None,
        }
    }

    /// User-visible status text.
    pub fn status_line(&self) -> String {
        match self.state {
            ConnectionState::Disconnected => "disconnected".to_owned(),
            ConnectionState::Connecting => "connecting".to_owned(),
            ConnectionState::Connected => "connected".to_owned(),
            ConnectionState::Reconnecting { attempt } => {
                format!("reconnecting ({attempt}/{})", self.max_attempts)
            }
            ConnectionState::Failed => "connection failed, please retry".to_owned(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
