// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turns an assembled frame's `event:`/`data:` lines into a typed record.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::epoch_ms;

/// Event name used when a frame has no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

const EVENT_PREFIX: &str = "event:";
const DATA_PREFIX: &str = "data:";

/// One decoded frame from a job stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamFrame {
    /// Value of the `event:` line, or [`DEFAULT_EVENT`].
    pub event: String,
    pub payload: Value,
    /// Payload `timestamp` if present, otherwise the receipt time.
    pub timestamp: String,
}

impl StreamFrame {
    /// The effective event kind: the `event:` name, or the payload's `type`
    /// field when the frame only carried the generic name.
    pub fn kind(&self) -> &str {
        if self.event == DEFAULT_EVENT {
            if let Some(kind) = self.payload.get("type").and_then(Value::as_str) {
                return kind;
            }
        }
        &self.event
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Non-negative integer field, accepting integral floats.
    pub fn count_field(&self, key: &str) -> Option<u64> {
        let value = self.payload.get(key)?;
        value.as_u64().or_else(|| {
            value.as_f64().filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)
        })
    }
}

/// Decode a frame. Frames without data, or with data that is not valid JSON,
/// are logged and dropped.
pub fn decode_frame(raw: &str) -> Option<StreamFrame> {
    let mut event: Option<String> = None;
    let mut data: Vec<&str> = Vec::new();

    for line in raw.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            let name = name.trim();
            if !name.is_empty() {
                event = Some(name.to_owned());
            }
        } else if let Some(value) = line.strip_prefix(DATA_PREFIX) {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data.is_empty() {
        debug!(frame = raw, "dropping frame without data lines");
        return None;
    }
    let joined = data.join("\n");
    let text = joined.trim();
    if text.is_empty() {
        debug!(frame = raw, "dropping frame with empty data");
        return None;
    }

    let payload: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(err = %e, data = text, "dropping frame with unparsable data");
            return None;
        }
    };

    let timestamp = payload
        .get("timestamp")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| epoch_ms().to_string());

    Some(StreamFrame { event: event.unwrap_or_else(|| DEFAULT_EVENT.to_owned()), payload, timestamp })
}

#[cfg(test)]
#[path = "decode_tests.rs"]
mod tests;
