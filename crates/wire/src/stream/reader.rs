// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental reader for chunked `text/event-stream` job responses.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::WireError;
use crate::stream::decode::{decode_frame, StreamFrame};
use crate::stream::frame::FrameAssembler;

/// Decoded frames from one streaming response.
///
/// Frames arrive in transport order. A transport failure is yielded once as
/// an `Err` and ends the stream. Dropping the handle aborts the request.
pub struct JobStream {
    rx: mpsc::Receiver<Result<StreamFrame, WireError>>,
    cancel: CancellationToken,
}

impl JobStream {
    /// Send `request` asking for an event stream and start reading the body.
    pub async fn open(request: reqwest::RequestBuilder) -> Result<Self, WireError> {
        let resp = request.header(reqwest::header::ACCEPT, "text/event-stream").send().await?;
        let resp = resp.error_for_status()?;
        Ok(Self::from_byte_stream(resp.bytes_stream()))
    }

    /// Read frames from any chunked byte source.
    pub fn from_byte_stream<S, E>(source: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        tokio::spawn(pump(Box::pin(source), tx, cancel.clone()));
        Self { rx, cancel }
    }

    /// Next frame, or `None` once the stream has ended or been closed.
    pub async fn next_frame(&mut self) -> Option<Result<StreamFrame, WireError>> {
        self.rx.recv().await
    }

    /// Abort the underlying request. Idempotent.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for JobStream {
    type Item = Result<StreamFrame, WireError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for JobStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn pump<S, E>(
    mut source: Pin<Box<S>>,
    tx: mpsc::Sender<Result<StreamFrame, WireError>>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Bytes, E>> + Send + ?Sized,
    E: fmt::Display,
{
    let mut asm = FrameAssembler::new();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("job stream closed by caller");
                return;
            }
            chunk = source.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                for raw in asm.push_bytes(&bytes) {
                    if !forward(&tx, &raw).await {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                debug!(err = %e, "job stream transport error");
                let _ = tx.send(Err(WireError::transport(e))).await;
                return;
            }
            None => break,
        }
    }
    // End of stream acts as a final delimiter.
    if let Some(raw) = asm.finish() {
        forward(&tx, &raw).await;
    }
}

/// Decode and forward one frame. Returns false once the reader is gone.
async fn forward(tx: &mpsc::Sender<Result<StreamFrame, WireError>>, raw: &str) -> bool {
    match decode_frame(raw) {
        Some(frame) => tx.send(Ok(frame)).await.is_ok(),
        None => !tx.is_closed(),
    }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
