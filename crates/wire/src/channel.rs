// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-console facade over the shared push connection.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::api::RestClient;
use crate::connection::{Multiplexer, Subscriber, Subscription};
use crate::error::WireError;
use crate::protocol::OutboundCommand;
use crate::store::{AUTH_TOKEN, USER_NAME};

/// Author name used when the store has none.
pub const DEFAULT_AGENT_NAME: &str = "Agent";

/// Which path delivered a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Push,
    Fallback,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Fallback => "fallback",
        }
    }
}

/// Chat operations for one agent console feature. Commands go over the push
/// connection; chat messages fall back to the REST endpoint when it is down.
#[derive(Clone)]
pub struct AgentChannel {
    mux: Multiplexer,
    rest: Arc<RestClient>,
}

impl AgentChannel {
    pub fn new(mux: Multiplexer, rest: Arc<RestClient>) -> Self {
        Self { mux, rest }
    }

    pub fn mux(&self) -> &Multiplexer {
        &self.mux
    }

    pub fn subscribe(&self, subscriber: Subscriber) -> Subscription {
        self.mux.subscribe(subscriber)
    }

    /// Deliver a chat message over the push connection, or through the REST
    /// endpoint when the push write is not possible. Errors only when both
    /// paths failed.
    pub async fn send_chat_message(
        &self,
        session_id: &str,
        project_id: &str,
        content: &str,
    ) -> Result<Delivery, WireError> {
        if self.mux.send(&OutboundCommand::chat(session_id, project_id, content)) {
            return Ok(Delivery::Push);
        }

        info!(session = %session_id, "push unavailable, sending chat message over REST");
        let store = self.mux.store();
        let token = store.require(AUTH_TOKEN)?;
        self.rest.send_chat_message(&token, session_id, content, &self.author_name()).await?;
        Ok(Delivery::Fallback)
    }

    /// Returns false without a session id or an open connection.
    pub fn send_typing(&self, is_typing: bool, session_id: &str) -> bool {
        if session_id.is_empty() {
            debug!("typing indicator without a session id");
            return false;
        }
        self.mux.send(&OutboundCommand::typing(is_typing, session_id, &self.author_name()))
    }

    pub fn subscribe_session(&self, session_id: &str) -> bool {
        self.mux.send(&OutboundCommand::subscribe(session_id))
    }

    pub fn unsubscribe_session(&self, session_id: &str) -> bool {
        self.mux.send(&OutboundCommand::unsubscribe(session_id))
    }

    pub fn send_read_receipt(&self, session_id: &str, message_id: &str, read_by: &str) -> bool {
        self.mux.send(&OutboundCommand::read_receipt(session_id, message_id, read_by))
    }

    fn author_name(&self) -> String {
        self.mux
            .store()
            .get(USER_NAME)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_AGENT_NAME.to_owned())
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
