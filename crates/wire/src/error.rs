// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes shared by the push connection, job streams, and REST calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A required session identifier is absent from the key-value store.
    MissingCredentials,
    /// The physical connection or HTTP transport failed.
    Transport,
    /// The server reported an error over an open channel.
    Protocol,
    /// A frame or payload could not be decoded.
    Decode,
    /// An HTTP endpoint answered with a non-success status.
    HttpStatus,
    /// A scrape or index job reported a terminal error.
    JobFailed,
    /// A link selection request violated the selection cap.
    Selection,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "MISSING_CREDENTIALS",
            Self::Transport => "TRANSPORT",
            Self::Protocol => "PROTOCOL",
            Self::Decode => "DECODE",
            Self::HttpStatus => "HTTP_STATUS",
            Self::JobFailed => "JOB_FAILED",
            Self::Selection => "SELECTION",
            Self::Internal => "INTERNAL",
        }
    }

    /// Whether a failure with this code may succeed if simply retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport | Self::Decode | Self::HttpStatus)
    }

    pub fn with_message(self, message: impl Into<String>) -> WireError {
        WireError { code: self, message: message.into() }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error value with a machine-readable code and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
}

impl WireError {
    pub fn missing(key: &str) -> Self {
        ErrorCode::MissingCredentials.with_message(format!("{key} is required but not stored"))
    }

    pub fn transport(err: impl fmt::Display) -> Self {
        ErrorCode::Transport.with_message(err.to_string())
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for WireError {}

impl From<reqwest::Error> for WireError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ErrorCode::HttpStatus.with_message(format!("{status}: {err}")),
            None if err.is_decode() => ErrorCode::Decode.with_message(err.to_string()),
            None => Self::transport(err),
        }
    }
}

impl From<serde_json::Error> for WireError {
    fn from(err: serde_json::Error) -> Self {
        ErrorCode::Decode.with_message(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
