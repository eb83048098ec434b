// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;

use crate::progress::Progress;
use crate::stream::StreamFrame;

/// Link discovery counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeProgress {
    pub job_id: Option<String>,
    /// Never regresses while running.
    pub links_found: u64,
    /// Depth of the most recent page; absent fields keep it.
    pub current_depth: u64,
    pub max_depth: u64,
}

impl ScrapeProgress {
    fn note_job_id(&mut self, frame: &StreamFrame) {
        if let Some(id) = frame.str_field("job_id").or_else(|| frame.str_field("id")) {
            self.job_id = Some(id.to_owned());
        }
    }
}

impl Progress for ScrapeProgress {
    fn on_running(&mut self, frame: &StreamFrame) {
        self.note_job_id(frame);
        if let Some(n) = frame.count_field("links_found") {
            self.links_found = self.links_found.max(n);
        }
        if let Some(d) = frame.count_field("current_depth") {
            self.current_depth = d;
        }
        if let Some(d) = frame.count_field("max_depth") {
            self.max_depth = self.max_depth.max(d);
        }
    }

    fn on_completed(&mut self, frame: &StreamFrame) {
        self.note_job_id(frame);
        // The terminal count is authoritative.
        if let Some(n) = frame.count_field("links_found") {
            self.links_found = n;
        }
    }
}
