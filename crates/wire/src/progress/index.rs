// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;

use crate::progress::Progress;
use crate::stream::StreamFrame;

/// Embedding/indexing counters. Once `total` is known,
/// `completed + pending <= total` holds after every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexProgress {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
    pub total_tokens: u64,
}

impl IndexProgress {
    fn clamp(&mut self) {
        if self.total == 0 {
            return;
        }
        self.total = self.total.max(self.completed);
        self.pending = self.pending.min(self.total - self.completed);
    }
}

impl Progress for IndexProgress {
    fn on_running(&mut self, frame: &StreamFrame) {
        // `embedding_started` reports only the pages left to embed as its
        // total, so totals keep the largest value seen.
        if let Some(n) = frame.count_field("total") {
            self.total = self.total.max(n);
        }
        if let Some(n) = frame.count_field("completed") {
            self.completed = self.completed.max(n);
        }
        if let Some(n) = frame.count_field("total_tokens") {
            self.total_tokens = self.total_tokens.max(n);
        }
        if let Some(n) = frame.count_field("pending") {
            self.pending = n;
        }
        self.clamp();
    }

    fn on_completed(&mut self, frame: &StreamFrame) {
        if let Some(n) = frame.count_field("total") {
            self.total = self.total.max(n);
        }
        if let Some(n) = frame.count_field("total_tokens") {
            self.total_tokens = self.total_tokens.max(n);
        }
        self.completed = match frame.count_field("completed") {
            Some(n) => n,
            None if self.total > 0 => self.total,
            None => self.completed,
        };
        self.pending = 0;
        self.clamp();
    }
}
