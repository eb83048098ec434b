// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat delivery over push with the REST fallback.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use deskwire::api::RestClient;
use deskwire::channel::{AgentChannel, Delivery};
use deskwire::connection::{ConnectionState, Multiplexer, Subscriber};
use deskwire::error::ErrorCode;
use deskwire::store::{MemoryStore, AUTH_TOKEN, TENANT_ID};
use deskwire_specs::{FakeBackend, Recorded, TENANT};

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn disconnected_push_falls_back_to_rest() -> anyhow::Result<()> {
    let backend = FakeBackend::builder().spawn().await?;
    let mux = Multiplexer::websocket(backend.mux_options(3), backend.agent_store());
    let channel = AgentChannel::new(mux, Arc::new(RestClient::new(&backend.api_url(), TIMEOUT)));

    let delivery = channel.send_chat_message("s1", "p1", "  hello  ").await?;
    assert_eq!(delivery, Delivery::Fallback);
    assert_eq!(
        backend.requests(),
        vec![Recorded {
            path: "/chat/sessions/s1/messages".to_owned(),
            body: json!({ "content": "hello", "message_type": "text", "user_name": "alice" }),
        }]
    );
    assert!(backend.from_clients().is_empty());
    Ok(())
}

#[tokio::test]
async fn connected_push_skips_rest() -> anyhow::Result<()> {
    let backend = FakeBackend::builder().spawn().await?;
    let mux = Multiplexer::websocket(backend.mux_options(3), backend.agent_store());
    let channel =
        AgentChannel::new(mux.clone(), Arc::new(RestClient::new(&backend.api_url(), TIMEOUT)));
    let _sub = channel.subscribe(Subscriber::new());
    let mut rx = mux.watch();
    tokio::time::timeout(TIMEOUT, rx.wait_for(|s| s.state == ConnectionState::Connected)).await??;

    let delivery = channel.send_chat_message("s1", "p1", "hello").await?;
    assert_eq!(delivery, Delivery::Push);
    backend.wait_until(TIMEOUT, |b| b.from_clients().len() == 1).await?;
    assert_eq!(backend.from_clients()[0]["type"], json!("chat_message"));
    assert_eq!(backend.from_clients()[0]["project_id"], json!("p1"));
    assert!(backend.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn both_paths_failing_is_an_error() -> anyhow::Result<()> {
    let backend = FakeBackend::builder().spawn().await?;
    let store = Arc::new(MemoryStore::with([(AUTH_TOKEN, "wrong"), (TENANT_ID, TENANT)]));
    let mux = Multiplexer::websocket(backend.mux_options(3), store);
    let channel = AgentChannel::new(mux, Arc::new(RestClient::new(&backend.api_url(), TIMEOUT)));

    let err = channel.send_chat_message("s1", "p1", "hello").await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::HttpStatus));
    assert!(backend.requests().is_empty());
    Ok(())
}
