// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::config::WireConfig;

/// Capped exponential backoff with an attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

/// What to do after an abnormal close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration },
    GiveUp,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base: Duration::from_millis(1000), cap: Duration::from_millis(30000), max_attempts: 5 }
    }
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self { base, cap, max_attempts }
    }

    pub fn from_config(config: &WireConfig) -> Self {
        Self::new(config.reconnect_base(), config.reconnect_cap(), config.max_reconnect_attempts)
    }

    /// `min(base * 2^attempt, cap)`, saturating on overflow.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.cap).min(self.cap)
    }

    /// `attempt` is the number of reconnects already scheduled since the
    /// last successful connect.
    pub fn next(&self, attempt: u32) -> Decision {
        if attempt < self.max_attempts {
            Decision::Retry { delay: self.delay(attempt) }
        } else {
            Decision::GiveUp
        }
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
