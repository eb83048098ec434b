// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared push connection: reconnect policy, timers, links, and the
//! multiplexer that fans events out to subscribers.

pub mod link;
pub mod mux;
pub mod policy;
pub mod schedule;
pub mod state;
pub mod subscriber;

pub use link::{Connector, Link, LinkEvent, WsConnector, NORMAL_CLOSE};
pub use mux::{Endpoint, Multiplexer, MuxOptions, Subscription};
pub use policy::{Decision, ReconnectPolicy};
pub use schedule::ScheduledTask;
pub use state::{ConnectionSnapshot, ConnectionState, LastEvent};
pub use subscriber::Subscriber;
