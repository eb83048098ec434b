// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Physical push-channel links and the connector seam.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::WireError;

/// Close code of a clean, caller-initiated close.
pub const NORMAL_CLOSE: u16 = 1000;

/// Something that happened on an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Text(String),
    /// Transport-level error. A `Closed` event always follows.
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

/// An open physical connection. Dropping `outbound` closes it cleanly.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens physical links. The multiplexer never dials directly, so tests can
/// substitute an in-memory connector.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Link, WireError>>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Link, WireError>> {
        let url = url.to_owned();
        Box::pin(async move {
            let (ws, _) =
                tokio_tungstenite::connect_async(url.as_str()).await.map_err(WireError::transport)?;
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            tokio::spawn(pump(ws, out_rx, in_tx));
            Ok(Link { outbound: out_tx, inbound: in_rx })
        })
    }
}

async fn pump<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    in_tx: mpsc::UnboundedSender<LinkEvent>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            out = out_rx.recv() => match out {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        let _ = in_tx.send(LinkEvent::Error(e.to_string()));
                        let _ = in_tx.send(LinkEvent::Closed { code: None, reason: e.to_string() });
                        return;
                    }
                }
                None => {
                    let frame = CloseFrame { code: CloseCode::Normal, reason: "".into() };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    tracing::debug!("push link closed by client");
                    return;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if in_tx.send(LinkEvent::Text(text.as_str().to_owned())).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.as_str().to_owned()),
                        None => (None, String::new()),
                    };
                    let _ = in_tx.send(LinkEvent::Closed { code, reason });
                    return;
                }
                Some(Err(e)) => {
                    let _ = in_tx.send(LinkEvent::Error(e.to_string()));
                    let _ = in_tx.send(LinkEvent::Closed { code: None, reason: e.to_string() });
                    return;
                }
                None => {
                    let _ = in_tx.send(LinkEvent::Closed { code: None, reason: "stream ended".to_owned() });
                    return;
                }
                _ => {} // ping/pong/binary ignored
            },
        }
    }
}
