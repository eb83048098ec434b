// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::connection::state::ConnectionSnapshot;
use crate::error::WireError;
use crate::protocol::{AlarmStage, Inbound, InboundEvent, Typing};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type AlarmCallback = Arc<dyn Fn(AlarmStage, &Value) + Send + Sync>;
type ReceiptCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Typed callbacks one feature registers with the multiplexer.
///
/// Every callback is optional. An event is delivered only to subscribers
/// holding a callback for its category. Callbacks run on the multiplexer
/// task, in transport order, and should return quickly.
#[derive(Clone, Default)]
pub struct Subscriber {
    on_state: Option<Callback<ConnectionSnapshot>>,
    on_event: Option<Callback<Inbound>>,
    on_message: Option<Callback<Value>>,
    on_typing: Option<Callback<Typing>>,
    on_session_update: Option<Callback<Value>>,
    on_notification: Option<Callback<Value>>,
    on_alarm: Option<AlarmCallback>,
    on_agent_joined: Option<Callback<Value>>,
    on_read_receipt: Option<ReceiptCallback>,
    on_error: Option<Callback<WireError>>,
}

impl Subscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_state(mut self, f: impl Fn(&ConnectionSnapshot) + Send + Sync + 'static) -> Self {
        self.on_state = Some(Arc::new(f));
        self
    }

    /// Every dispatched event with its timestamp, before the category
    /// callback. The timestamp is the server's, or the receipt time in epoch
    /// milliseconds when the envelope had none.
    pub fn on_event(mut self, f: impl Fn(&Inbound) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(f));
        self
    }

    pub fn on_message(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_typing(mut self, f: impl Fn(&Typing) + Send + Sync + 'static) -> Self {
        self.on_typing = Some(Arc::new(f));
        self
    }

    pub fn on_session_update(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_session_update = Some(Arc::new(f));
        self
    }

    pub fn on_notification(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_notification = Some(Arc::new(f));
        self
    }

    pub fn on_alarm(mut self, f: impl Fn(AlarmStage, &Value) + Send + Sync + 'static) -> Self {
        self.on_alarm = Some(Arc::new(f));
        self
    }

    pub fn on_agent_joined(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_agent_joined = Some(Arc::new(f));
        self
    }

    /// Called with the id of the message the other side has read.
    pub fn on_read_receipt(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_read_receipt = Some(Arc::new(f));
        self
    }

    /// Protocol errors and the terminal connectivity error.
    pub fn on_error(mut self, f: impl Fn(&WireError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn notify_state(&self, snapshot: &ConnectionSnapshot) {
        if let Some(f) = &self.on_state {
            f(snapshot);
        }
    }

    pub(crate) fn notify_error(&self, err: &WireError) {
        if let Some(f) = &self.on_error {
            f(err);
        }
    }

    /// Route `inbound` to its callbacks. Returns whether one was invoked.
    pub(crate) fn deliver(&self, inbound: &Inbound) -> bool {
        fn call<T>(cb: &Option<Callback<T>>, arg: &T) -> bool {
            match cb {
                Some(f) => {
                    f(arg);
                    true
                }
                None => false,
            }
        }

        let seen = call(&self.on_event, inbound);
        let routed = match &inbound.event {
            InboundEvent::ChatMessage(v) => call(&self.on_message, v),
            InboundEvent::Typing(t) => call(&self.on_typing, t),
            InboundEvent::SessionUpdate(v) => call(&self.on_session_update, v),
            InboundEvent::Notification(v) => call(&self.on_notification, v),
            InboundEvent::Alarm { stage, payload } => match &self.on_alarm {
                Some(f) => {
                    f(*stage, payload);
                    true
                }
                None => false,
            },
            InboundEvent::AgentJoined(v) => call(&self.on_agent_joined, v),
            InboundEvent::ReadReceipt { message_id } => match &self.on_read_receipt {
                Some(f) => {
                    f(message_id);
                    true
                }
                None => false,
            },
            InboundEvent::ProtocolError(message) => {
                let err = crate::error::ErrorCode::Protocol.with_message(message.clone());
                call(&self.on_error, &err)
            }
            InboundEvent::Pong => false,
        };
        seen || routed
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("on_state", &self.on_state.is_some())
            .field("on_event", &self.on_event.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_typing", &self.on_typing.is_some())
            .field("on_session_update", &self.on_session_update.is_some())
            .field("on_notification", &self.on_notification.is_some())
            .field("on_alarm", &self.on_alarm.is_some())
            .field("on_agent_joined", &self.on_agent_joined.is_some())
            .field("on_read_receipt", &self.on_read_receipt.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
