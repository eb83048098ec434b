// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push-channel message types and conversions.
//!
//! Inbound payloads are JSON envelopes `{type, data, timestamp, session_id?,
//! error?}`. Only the envelope is interpreted here; `data` stays a raw JSON
//! value owned by the backend's schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, WireError};

const GENERIC_PROTOCOL_ERROR: &str = "WebSocket error occurred";

// -- Inbound -----------------------------------------------------------------

/// Raw inbound envelope as sent by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Event categories subscribers can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    ChatMessage,
    Typing,
    SessionUpdate,
    Notification,
    Alarm,
    AgentJoined,
    ReadReceipt,
    ProtocolError,
    Pong,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatMessage => "chat_message",
            Self::Typing => "typing",
            Self::SessionUpdate => "session_update",
            Self::Notification => "notification",
            Self::Alarm => "alarm",
            Self::AgentJoined => "agent_joined",
            Self::ReadReceipt => "read_receipt",
            Self::ProtocolError => "protocol_error",
            Self::Pong => "pong",
        }
    }
}

/// Alarm lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmStage {
    Triggered,
    Acknowledged,
    Escalated,
}

/// Typing indicator from another participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Typing {
    pub is_typing: bool,
    pub author_name: String,
    pub session_id: String,
}

/// Decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ChatMessage(Value),
    Typing(Typing),
    SessionUpdate(Value),
    Notification(Value),
    Alarm { stage: AlarmStage, payload: Value },
    AgentJoined(Value),
    ReadReceipt { message_id: String },
    ProtocolError(String),
    Pong,
}

impl InboundEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            Self::ChatMessage(_) => EventCategory::ChatMessage,
            Self::Typing(_) => EventCategory::Typing,
            Self::SessionUpdate(_) => EventCategory::SessionUpdate,
            Self::Notification(_) => EventCategory::Notification,
            Self::Alarm { .. } => EventCategory::Alarm,
            Self::AgentJoined(_) => EventCategory::AgentJoined,
            Self::ReadReceipt { .. } => EventCategory::ReadReceipt,
            Self::ProtocolError(_) => EventCategory::ProtocolError,
            Self::Pong => EventCategory::Pong,
        }
    }
}

/// An inbound event with its envelope timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub event: InboundEvent,
    /// Server-provided timestamp, if any. The multiplexer fills in the
    /// receipt time before delivery.
    pub timestamp: Option<String>,
}

/// Outcome of decoding one push-channel text message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(Inbound),
    /// Well-formed envelope that carries nothing to dispatch.
    Ignored { kind: String, reason: &'static str },
}

/// Which typing indicators a client surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingRule {
    /// Agent console: everyone except the named local user.
    ExceptSelf(Option<String>),
    /// Widget visitor: only indicators authored by an agent.
    AgentsOnly,
}

impl TypingRule {
    fn admits(&self, data: &Value, author_name: &str) -> bool {
        match self {
            Self::ExceptSelf(me) => me.as_deref() != Some(author_name),
            Self::AgentsOnly => {
                let role = str_field(data, "author_type").or_else(|| str_field(data, "sender"));
                role.as_deref() == Some("agent")
            }
        }
    }
}

/// Decode a push-channel text message.
///
/// `typing` decides which typing indicators reach subscribers. Malformed
/// JSON is the only failure; unknown or incomplete envelopes are reported
/// as [`Decoded::Ignored`].
pub fn decode_message(text: &str, typing: &TypingRule) -> Result<Decoded, WireError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    Ok(decode_envelope(envelope, typing))
}

pub fn decode_envelope(envelope: Envelope, typing: &TypingRule) -> Decoded {
    let Envelope { kind, data, timestamp, session_id, error } = envelope;
    let ignored = |kind: String, reason| Decoded::Ignored { kind, reason };

    let event = match kind.as_str() {
        "chat_message" => InboundEvent::ChatMessage(data),
        "session_update" | "session_assigned" => {
            if data.is_null() {
                return ignored(kind, "missing data");
            }
            InboundEvent::SessionUpdate(data)
        }
        "typing_start" | "typing_stop" => {
            // Producers disagree on where the session id lives; accept both.
            let session = session_id.or_else(|| str_field(&data, "session_id"));
            let author = str_field(&data, "author_name")
                .or_else(|| str_field(&data, "agentName"))
                .or_else(|| str_field(&data, "sender_name"));
            let (Some(session_id), Some(author_name)) = (session, author) else {
                return ignored(kind, "typing without session or author");
            };
            if !typing.admits(&data, &author_name) {
                return ignored(kind, "typing filtered for this client");
            }
            InboundEvent::Typing(Typing {
                is_typing: kind == "typing_start",
                author_name,
                session_id,
            })
        }
        "notification" => {
            if data.is_null() {
                return ignored(kind, "missing data");
            }
            InboundEvent::Notification(data)
        }
        "alarm_triggered" | "alarm_acknowledged" | "alarm_escalated" => {
            if data.is_null() {
                return ignored(kind, "missing data");
            }
            let stage = match kind.as_str() {
                "alarm_triggered" => AlarmStage::Triggered,
                "alarm_acknowledged" => AlarmStage::Acknowledged,
                _ => AlarmStage::Escalated,
            };
            InboundEvent::Alarm { stage, payload: data }
        }
        "agent_joined" => InboundEvent::AgentJoined(data),
        "message_read" => match str_field(&data, "message_id") {
            Some(message_id) => InboundEvent::ReadReceipt { message_id },
            None => return ignored(kind, "read receipt without message_id"),
        },
        "error" => {
            let message = error
                .filter(|e| !e.is_empty())
                .or_else(|| str_field(&data, "error"))
                .unwrap_or_else(|| GENERIC_PROTOCOL_ERROR.to_owned());
            InboundEvent::ProtocolError(message)
        }
        "pong" => InboundEvent::Pong,
        _ => return ignored(kind, "unknown type"),
    };

    Decoded::Event(Inbound { event, timestamp })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned)
}

// -- Outbound ----------------------------------------------------------------

/// Body of an outbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBody {
    pub content: String,
    pub message_type: String,
}

/// Author block attached to typing indicators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingAuthor {
    pub author_type: String,
    pub author_name: String,
}

/// Body of a read receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadBody {
    pub message_id: String,
    pub read_by: String,
}

/// Empty `data` object for commands that carry no body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Commands written to the push channel. Fire-and-forget: success only means
/// the connection accepted the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    ChatMessage { agent_session_id: String, project_id: String, data: ChatBody },
    TypingStart { agent_session_id: String, data: TypingAuthor },
    TypingStop { agent_session_id: String, data: TypingAuthor },
    SessionSubscribe { agent_session_id: String, data: Empty },
    SessionUnsubscribe { agent_session_id: String, data: Empty },
    MessageRead { client_session_id: String, data: ReadBody },
    Ping,
}

impl OutboundCommand {
    pub fn chat(session_id: &str, project_id: &str, content: &str) -> Self {
        Self::ChatMessage {
            agent_session_id: session_id.to_owned(),
            project_id: project_id.to_owned(),
            data: ChatBody { content: content.trim().to_owned(), message_type: "text".to_owned() },
        }
    }

    pub fn typing(is_typing: bool, session_id: &str, author_name: &str) -> Self {
        let data =
            TypingAuthor { author_type: "agent".to_owned(), author_name: author_name.to_owned() };
        let agent_session_id = session_id.to_owned();
        if is_typing {
            Self::TypingStart { agent_session_id, data }
        } else {
            Self::TypingStop { agent_session_id, data }
        }
    }

    pub fn subscribe(session_id: &str) -> Self {
        Self::SessionSubscribe { agent_session_id: session_id.to_owned(), data: Empty {} }
    }

    pub fn unsubscribe(session_id: &str) -> Self {
        Self::SessionUnsubscribe { agent_session_id: session_id.to_owned(), data: Empty {} }
    }

    pub fn read_receipt(session_id: &str, message_id: &str, read_by: &str) -> Self {
        Self::MessageRead {
            client_session_id: session_id.to_owned(),
            data: ReadBody { message_id: message_id.to_owned(), read_by: read_by.to_owned() },
        }
    }

    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self)
            .map_err(|e| ErrorCode::Internal.with_message(format!("encode command: {e}")))
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
