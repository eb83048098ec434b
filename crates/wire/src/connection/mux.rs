// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One physical push connection shared by every in-process subscriber.
//!
//! A single task owns the connection, the subscriber registry, and every
//! timer. Handles talk to it over a command channel, so all state changes
//! are serialized and subscribers observe them in order.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WireConfig;
use crate::connection::link::{Connector, Link, LinkEvent, WsConnector, NORMAL_CLOSE};
use crate::connection::policy::{Decision, ReconnectPolicy};
use crate::connection::schedule::ScheduledTask;
use crate::connection::state::{ConnectionSnapshot, ConnectionState, LastEvent};
use crate::connection::subscriber::Subscriber;
use crate::epoch_ms;
use crate::error::{ErrorCode, WireError};
use crate::protocol::{decode_message, Decoded, InboundEvent, OutboundCommand, TypingRule};
use crate::store::{Credentials, SessionStore};

/// Which push endpoint the multiplexer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Agent,
    Widget,
}

#[derive(Debug, Clone)]
pub struct MuxOptions {
    pub endpoint: Endpoint,
    pub ws_base: String,
    pub policy: ReconnectPolicy,
    pub ping_interval: Duration,
    pub manual_retry_delay: Duration,
}

impl MuxOptions {
    pub fn from_config(config: &WireConfig, endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ws_base: config.ws_base(),
            policy: ReconnectPolicy::from_config(config),
            ping_interval: config.ping_interval(),
            manual_retry_delay: config.manual_retry_delay(),
        }
    }
}

/// Resolved URL and typing visibility for one connection.
#[derive(Debug, Clone)]
struct Target {
    url: String,
    typing: TypingRule,
}

enum Command {
    Subscribe { id: Uuid, subscriber: Subscriber, target: Option<Target> },
    Unsubscribe { id: Uuid },
    Connect(Target),
    Disconnect,
    ManualRetry(Target),
    Established { epoch: u64, result: Result<Link, WireError> },
    ReconnectDue { epoch: u64 },
    RetryDue { epoch: u64 },
    PingDue { epoch: u64 },
}

type Writer = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

struct Shared {
    cmd_tx: mpsc::UnboundedSender<Command>,
    writer: Writer,
    state_rx: watch::Receiver<ConnectionSnapshot>,
    store: Arc<dyn SessionStore>,
    options: MuxOptions,
}

/// Handle to the connection multiplexer. Cheap to clone; the connection
/// task stops once every handle and subscription is gone.
#[derive(Clone)]
pub struct Multiplexer {
    shared: Arc<Shared>,
}

impl Multiplexer {
    /// Spawn the connection task. Must be called inside a tokio runtime.
    pub fn new(
        options: MuxOptions,
        store: Arc<dyn SessionStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let snapshot = ConnectionSnapshot::new(options.policy.max_attempts);
        let (state_tx, state_rx) = watch::channel(snapshot.clone());
        let writer: Writer = Arc::new(Mutex::new(None));

        let actor = Actor {
            options: options.clone(),
            connector,
            self_tx: cmd_tx.downgrade(),
            writer: Arc::clone(&writer),
            state_tx,
            snapshot,
            subscribers: IndexMap::new(),
            target: None,
            inbound: None,
            epoch: 0,
            exhausted: false,
            reconnect: None,
            retry: None,
            ping: None,
        };
        tokio::spawn(actor.run(cmd_rx));

        Self { shared: Arc::new(Shared { cmd_tx, writer, state_rx, store, options }) }
    }

    /// Multiplexer over real WebSocket links.
    pub fn websocket(options: MuxOptions, store: Arc<dyn SessionStore>) -> Self {
        Self::new(options, store, Arc::new(WsConnector))
    }

    /// Register `subscriber`. It receives the current snapshot before any
    /// other callback. The first subscriber opens the connection when
    /// credentials are stored.
    pub fn subscribe(&self, subscriber: Subscriber) -> Subscription {
        let id = Uuid::new_v4();
        let target = match self.target() {
            Ok(t) => Some(t),
            Err(e) => {
                debug!(err = %e, "subscriber registered without credentials");
                None
            }
        };
        self.command(Command::Subscribe { id, subscriber, target });
        Subscription { id, mux: self.clone(), released: false }
    }

    /// Open the connection. A no-op while connected, connecting, or after the
    /// attempt ceiling was reached. Fails immediately when credentials are
    /// missing.
    pub fn connect(&self) -> Result<(), WireError> {
        let target = self.target()?;
        self.command(Command::Connect(target));
        Ok(())
    }

    /// Close the connection and cancel every timer. Idempotent.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Reset the attempt count and reconnect after a short delay, whatever
    /// the prior failure state.
    pub fn manual_retry(&self) -> Result<(), WireError> {
        let target = self.target()?;
        self.command(Command::ManualRetry(target));
        Ok(())
    }

    /// Write `command` if the connection is open. Returns whether the write
    /// was attempted; nothing is queued or retried.
    pub fn send(&self, command: &OutboundCommand) -> bool {
        let text = match command.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(err = %e, "failed to encode outbound command");
                return false;
            }
        };
        match self.shared.writer.lock().as_ref() {
            Some(writer) => writer.send(text).is_ok(),
            None => {
                debug!("push connection not open, command not sent");
                false
            }
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.shared.state_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.shared.state_rx.clone()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.shared.store
    }

    fn target(&self) -> Result<Target, WireError> {
        let store = self.shared.store.as_ref();
        let creds = match self.shared.options.endpoint {
            Endpoint::Agent => Credentials::agent(store)?,
            Endpoint::Widget => Credentials::widget(store)?,
        };
        Ok(Target {
            url: creds.push_url(&self.shared.options.ws_base),
            typing: creds.typing_rule(),
        })
    }

    fn command(&self, command: Command) {
        if self.shared.cmd_tx.send(command).is_err() {
            debug!("multiplexer task has stopped");
        }
    }
}

/// Registration handle. Unsubscribes on [`Subscription::unsubscribe`] or drop.
pub struct Subscription {
    id: Uuid,
    mux: Multiplexer,
    released: bool,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.mux.command(Command::Unsubscribe { id: self.id });
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

// -- Connection task ---------------------------------------------------------

struct Actor {
    options: MuxOptions,
    connector: Arc<dyn Connector>,
    self_tx: mpsc::WeakUnboundedSender<Command>,
    writer: Writer,
    state_tx: watch::Sender<ConnectionSnapshot>,
    snapshot: ConnectionSnapshot,
    subscribers: IndexMap<Uuid, Subscriber>,
    target: Option<Target>,
    inbound: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    /// Bumped on every attempt and disconnect; timers and dial results
    /// carrying an older epoch are stale.
    epoch: u64,
    /// Attempt ceiling reached; cleared by a manual retry or a successful connect.
    exhausted: bool,
    reconnect: Option<ScheduledTask>,
    retry: Option<ScheduledTask>,
    ping: Option<ScheduledTask>,
}

enum Wake {
    Command(Option<Command>),
    Link(Option<LinkEvent>),
}

async fn next_link_event(rx: &mut Option<mpsc::UnboundedReceiver<LinkEvent>>) -> Option<LinkEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Actor {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let wake = tokio::select! {
                cmd = cmd_rx.recv() => Wake::Command(cmd),
                ev = next_link_event(&mut self.inbound) => Wake::Link(ev),
            };
            match wake {
                Wake::Command(Some(cmd)) => self.handle(cmd),
                Wake::Command(None) => break,
                Wake::Link(Some(ev)) => self.on_link_event(ev),
                Wake::Link(None) => self.on_closed(None, "link dropped".to_owned()),
            }
        }
        self.drop_link();
        debug!("multiplexer stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Subscribe { id, subscriber, target } => {
                let first = self.subscribers.is_empty();
                subscriber.notify_state(&self.snapshot);
                self.subscribers.insert(id, subscriber);
                debug!(%id, subscribers = self.subscribers.len(), "subscriber registered");
                if let (true, Some(target)) = (first, target) {
                    self.connect(target);
                }
            }
            Command::Unsubscribe { id } => {
                if self.subscribers.shift_remove(&id).is_some() {
                    debug!(%id, subscribers = self.subscribers.len(), "subscriber removed");
                    if self.subscribers.is_empty() {
                        info!("last subscriber left, closing push connection");
                        self.disconnect();
                    }
                }
            }
            Command::Connect(target) => self.connect(target),
            Command::Disconnect => self.disconnect(),
            Command::ManualRetry(target) => {
                info!("manual retry requested");
                self.disconnect();
                self.exhausted = false;
                self.snapshot.attempt_count = 0;
                self.snapshot.last_error = None;
                self.publish();
                self.target = Some(target);
                let epoch = self.epoch;
                self.retry =
                    Some(self.schedule(self.options.manual_retry_delay, Command::RetryDue { epoch }));
            }
            Command::RetryDue { epoch } => {
                if epoch == self.epoch {
                    self.retry = None;
                    if let Some(target) = self.target.clone() {
                        self.connect(target);
                    }
                }
            }
            Command::ReconnectDue { epoch } => {
                if epoch == self.epoch && !self.subscribers.is_empty() {
                    self.reconnect = None;
                    self.begin_attempt();
                }
            }
            Command::PingDue { epoch } => {
                if epoch == self.epoch && self.snapshot.is_connected() {
                    self.write(&OutboundCommand::Ping);
                }
            }
            Command::Established { epoch, result } => self.on_established(epoch, result),
        }
    }

    fn connect(&mut self, target: Target) {
        match self.snapshot.state {
            ConnectionState::Connected
            | ConnectionState::Connecting
            | ConnectionState::Reconnecting { .. } => {
                debug!(state = self.snapshot.state.as_str(), "connect ignored");
                return;
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {}
        }
        if self.exhausted {
            debug!(
                attempts = self.snapshot.attempt_count,
                "connect ignored, attempt ceiling reached until manual retry"
            );
            return;
        }
        self.target = Some(target);
        self.begin_attempt();
    }

    /// Dial once. Bypasses the ceiling check so scheduled reconnects run.
    fn begin_attempt(&mut self) {
        let Some(target) = &self.target else {
            warn!("no push target resolved, cannot connect");
            return;
        };
        self.epoch += 1;
        let epoch = self.epoch;
        let url = target.url.clone();
        let attempt = self.snapshot.attempt_count;
        debug!(epoch, attempt, "opening push connection");

        let connector = Arc::clone(&self.connector);
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect(&url).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Established { epoch, result });
            }
        });

        if attempt == 0 {
            self.set_state(ConnectionState::Connecting);
        } else {
            self.set_state(ConnectionState::Reconnecting { attempt });
        }
    }

    fn on_established(&mut self, epoch: u64, result: Result<Link, WireError>) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding stale dial result");
            return;
        }
        match result {
            Ok(link) => {
                *self.writer.lock() = Some(link.outbound);
                self.inbound = Some(link.inbound);
                self.exhausted = false;
                self.snapshot.attempt_count = 0;
                self.snapshot.last_error = None;

                let tx = self.self_tx.clone();
                self.ping = Some(ScheduledTask::every(self.options.ping_interval, move || {
                    tx.upgrade().is_some_and(|tx| tx.send(Command::PingDue { epoch }).is_ok())
                }));
                info!(subscribers = self.subscribers.len(), "push connection established");
                self.set_state(ConnectionState::Connected);
            }
            Err(e) => {
                warn!(err = %e, attempt = self.snapshot.attempt_count, "push connection failed");
                self.snapshot.last_error = Some(e.message);
                self.on_abnormal_close();
            }
        }
    }

    fn on_link_event(&mut self, ev: LinkEvent) {
        match ev {
            LinkEvent::Text(text) => self.dispatch(&text),
            LinkEvent::Error(message) => {
                debug!(err = %message, "push link error");
                self.snapshot.last_error = Some(message);
                self.state_tx.send_replace(self.snapshot.clone());
            }
            LinkEvent::Closed { code, reason } => self.on_closed(code, reason),
        }
    }

    fn on_closed(&mut self, code: Option<u16>, reason: String) {
        self.drop_link();
        if code == Some(NORMAL_CLOSE) {
            info!("push connection closed normally");
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        warn!(?code, reason = %reason, "push connection closed abnormally");
        if self.snapshot.last_error.is_none() && !reason.is_empty() {
            self.snapshot.last_error = Some(reason);
        }
        self.on_abnormal_close();
    }

    /// One failed or dropped physical connection: count it once and decide.
    fn on_abnormal_close(&mut self) {
        if self.subscribers.is_empty() {
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        let max = self.options.policy.max_attempts;
        match self.options.policy.next(self.snapshot.attempt_count) {
            Decision::Retry { delay } => {
                self.snapshot.attempt_count += 1;
                let attempt = self.snapshot.attempt_count;
                info!(attempt, max, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                let epoch = self.epoch;
                self.reconnect = Some(self.schedule(delay, Command::ReconnectDue { epoch }));
                self.set_state(ConnectionState::Reconnecting { attempt });
            }
            Decision::GiveUp => {
                self.exhausted = true;
                let err = ErrorCode::Transport
                    .with_message(format!("connection failed after {max} attempts"));
                warn!(attempts = self.snapshot.attempt_count, "giving up on push connection");
                self.snapshot.last_error = Some(err.message.clone());
                self.set_state(ConnectionState::Failed);
                for sub in self.subscribers.values() {
                    sub.notify_error(&err);
                }
            }
        }
    }

    fn disconnect(&mut self) {
        self.epoch += 1;
        self.reconnect = None;
        self.retry = None;
        if self.drop_link() {
            info!("push connection closed by client");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Release the physical link. Dropping the writer closes it cleanly.
    fn drop_link(&mut self) -> bool {
        let had_writer = self.writer.lock().take().is_some();
        let had_inbound = self.inbound.take().is_some();
        self.ping = None;
        had_writer || had_inbound
    }

    fn dispatch(&mut self, text: &str) {
        let unfiltered = TypingRule::ExceptSelf(None);
        let typing = self.target.as_ref().map_or(&unfiltered, |t| &t.typing);
        let mut inbound = match decode_message(text, typing) {
            Ok(Decoded::Event(inbound)) => inbound,
            Ok(Decoded::Ignored { kind, reason }) => {
                debug!(kind = %kind, reason, "push message ignored");
                return;
            }
            Err(e) => {
                warn!(err = %e, "dropping malformed push message");
                return;
            }
        };

        let category = inbound.event.category();
        match &inbound.event {
            InboundEvent::Pong => {
                debug!("pong");
                return;
            }
            InboundEvent::ProtocolError(message) => {
                warn!(err = %message, "server reported an error");
                self.snapshot.last_error = Some(message.clone());
            }
            _ => {}
        }
        let at_ms = epoch_ms();
        self.snapshot.last_event = Some(LastEvent { category, at_ms });
        self.state_tx.send_replace(self.snapshot.clone());

        inbound.timestamp.get_or_insert_with(|| at_ms.to_string());
        let delivered = self.subscribers.values().filter(|sub| sub.deliver(&inbound)).count();
        debug!(category = category.as_str(), delivered, "push event dispatched");
    }

    fn write(&self, command: &OutboundCommand) {
        let text = match command.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(err = %e, "failed to encode outbound command");
                return;
            }
        };
        if let Some(writer) = self.writer.lock().as_ref() {
            let _ = writer.send(text);
        }
    }

    fn schedule(&self, delay: Duration, cmd: Command) -> ScheduledTask {
        let tx = self.self_tx.clone();
        ScheduledTask::after(delay, async move {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(cmd);
            }
        })
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.snapshot.state != state {
            self.snapshot.state = state;
            self.publish();
        }
    }

    /// Push the snapshot to the watch channel and every `on_state` callback.
    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot.clone());
        for sub in self.subscribers.values() {
            sub.notify_state(&self.snapshot);
        }
    }
}

#[cfg(test)]
#[path = "mux_tests.rs"]
mod tests;
