// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end push connection tests against the fake backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use deskwire::api::RestClient;
use deskwire::channel::AgentChannel;
use deskwire::connection::{ConnectionSnapshot, ConnectionState, Multiplexer, Subscriber};
use deskwire::store::{MemoryStore, SessionStore, AUTH_TOKEN, TENANT_ID, USER_NAME};
use deskwire_specs::{FakeBackend, TENANT, TOKEN};

const TIMEOUT: Duration = Duration::from_secs(10);

async fn wait_for(
    mux: &Multiplexer,
    pred: impl Fn(&ConnectionSnapshot) -> bool,
) -> anyhow::Result<ConnectionSnapshot> {
    let mut rx = mux.watch();
    let snap = tokio::time::timeout(TIMEOUT, rx.wait_for(|s| pred(s))).await??;
    Ok(snap.clone())
}

fn connected(s: &ConnectionSnapshot) -> bool {
    s.state == ConnectionState::Connected
}

#[tokio::test]
async fn chat_event_reaches_subscriber() -> anyhow::Result<()> {
    deskwire::ensure_crypto();
    let backend = FakeBackend::builder().spawn().await?;
    let mux = Multiplexer::websocket(backend.mux_options(3), backend.agent_store());

    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let _sub = mux.subscribe(Subscriber::new().on_message(move |v| {
        let _ = tx.send(v.clone());
    }));
    wait_for(&mux, connected).await?;
    backend.wait_until(TIMEOUT, |b| b.connections() == 1).await?;

    backend.push_json(json!({ "type": "typing_start", "session_id": "s1", "data": { "author_name": "bob" } }));
    backend.push_json(json!({
        "type": "chat_message",
        "data": { "id": "m1", "content": "hi there" },
        "timestamp": "2026-10-17T10:00:00Z",
    }));

    let got = tokio::time::timeout(TIMEOUT, rx.recv()).await?;
    assert_eq!(got, Some(json!({ "id": "m1", "content": "hi there" })));
    let last = mux.snapshot().last_event.map(|e| e.category.as_str());
    assert_eq!(last, Some("chat_message"));
    Ok(())
}

#[tokio::test]
async fn commands_arrive_in_order() -> anyhow::Result<()> {
    let backend = FakeBackend::builder().spawn().await?;
    let mux = Multiplexer::websocket(backend.mux_options(3), backend.agent_store());
    let channel = AgentChannel::new(mux.clone(), Arc::new(RestClient::new(&backend.api_url(), TIMEOUT)));
    let _sub = channel.subscribe(Subscriber::new());
    wait_for(&mux, connected).await?;

    assert!(channel.subscribe_session("s1"));
    assert!(channel.send_typing(true, "s1"));
    assert!(channel.send_read_receipt("s1", "m9", "alice"));
    backend.wait_until(TIMEOUT, |b| b.from_clients().len() == 3).await?;

    let types: Vec<Value> = backend.from_clients().iter().map(|v| v["type"].clone()).collect();
    assert_eq!(types, vec![json!("session_subscribe"), json!("typing_start"), json!("message_read")]);
    assert_eq!(backend.from_clients()[1]["data"]["author_name"], json!("alice"));
    Ok(())
}

#[tokio::test]
async fn rejected_token_fails_after_ceiling_then_manual_retry_recovers() -> anyhow::Result<()> {
    let backend = FakeBackend::builder().spawn().await?;
    let store = Arc::new(MemoryStore::with([
        (AUTH_TOKEN, "wrong"),
        (TENANT_ID, TENANT),
        (USER_NAME, "alice"),
    ]));
    let mux = Multiplexer::websocket(backend.mux_options(2), store.clone());

    let errors = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&errors);
    let _sub = mux.subscribe(Subscriber::new().on_error(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    }));

    let snap = wait_for(&mux, |s| s.state == ConnectionState::Failed).await?;
    assert_eq!(snap.status_line(), "connection failed, please retry");
    assert_eq!(backend.connections(), 0);
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    // Further automatic connects stay gated.
    mux.connect()?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(mux.snapshot().state, ConnectionState::Failed);

    store.set(AUTH_TOKEN, TOKEN)?;
    mux.manual_retry()?;
    let snap = wait_for(&mux, connected).await?;
    assert_eq!(snap.attempt_count, 0);
    assert_eq!(backend.connections(), 1);
    Ok(())
}

#[tokio::test]
async fn abnormal_close_reconnects() -> anyhow::Result<()> {
    let backend = FakeBackend::builder().spawn().await?;
    let mux = Multiplexer::websocket(backend.mux_options(3), backend.agent_store());
    let _sub = mux.subscribe(Subscriber::new());
    wait_for(&mux, connected).await?;
    backend.wait_until(TIMEOUT, |b| b.connections() == 1).await?;

    backend.close_clients(1011);
    backend.wait_until(TIMEOUT, |b| b.connections() == 2).await?;
    let snap = wait_for(&mux, connected).await?;
    assert_eq!(snap.attempt_count, 0);
    Ok(())
}

#[tokio::test]
async fn normal_close_does_not_reconnect() -> anyhow::Result<()> {
    let backend = FakeBackend::builder().spawn().await?;
    let mux = Multiplexer::websocket(backend.mux_options(3), backend.agent_store());
    let _sub = mux.subscribe(Subscriber::new());
    wait_for(&mux, connected).await?;
    backend.wait_until(TIMEOUT, |b| b.connections() == 1).await?;

    backend.close_clients(1000);
    wait_for(&mux, |s| s.state == ConnectionState::Disconnected).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(backend.connections(), 1);
    assert_eq!(mux.snapshot().state, ConnectionState::Disconnected);
    Ok(())
}
