// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage tracking for the AI builder, which sets up a chat widget and its
//! knowledge base from one website in a single stream.

use serde::Serialize;
use serde_json::Value;

use crate::progress::{KindEffect, Progress};
use crate::stream::StreamFrame;

/// Builder stages in display order, as `(key, label)`.
pub const BUILDER_STAGES: [(&str, &str); 4] = [
    ("widget", "Chat Widget"),
    ("scraping", "Discovery"),
    ("indexing", "Indexing"),
    ("faq", "Knowledge Q&A"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Active,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageState {
    pub key: &'static str,
    pub label: &'static str,
    pub status: StageStatus,
}

/// Stage statuses plus the artifacts the builder reports along the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuilderProgress {
    pub stages: Vec<StageState>,
    /// Links the builder chose for the knowledge base.
    pub selected_links: Vec<Value>,
    pub faq_count: Option<u64>,
    pub embed_code: Option<String>,
}

impl Default for BuilderProgress {
    fn default() -> Self {
        Self {
            stages: BUILDER_STAGES
                .iter()
                .map(|&(key, label)| StageState { key, label, status: StageStatus::Pending })
                .collect(),
            selected_links: Vec::new(),
            faq_count: None,
            embed_code: None,
        }
    }
}

impl BuilderProgress {
    pub fn stage(&self, key: &str) -> Option<StageStatus> {
        self.stages.iter().find(|s| s.key == key).map(|s| s.status)
    }

    /// Status a frame kind gives its stage.
    pub fn stage_effect(kind: &str) -> StageStatus {
        if kind == "error" || kind.ends_with("_error") {
            StageStatus::Error
        } else if kind == "completed"
            || kind.ends_with("_completed")
            || matches!(kind, "faq_ready" | "widget_ready" | "knowledge_links_chosen")
        {
            StageStatus::Complete
        } else {
            StageStatus::Active
        }
    }

    fn note(&mut self, frame: &StreamFrame) {
        // Stages outside the display list (initialization, summary) are not tracked.
        if let Some(key) = frame.str_field("stage") {
            let status = Self::stage_effect(frame.kind());
            if let Some(stage) = self.stages.iter_mut().find(|s| s.key == key) {
                stage.status = status;
            }
        }

        let Some(data) = frame.payload.get("data") else {
            return;
        };
        if let Some(links) = data.get("selected_links").and_then(Value::as_array) {
            self.selected_links = links.clone();
        }
        if let Some(count) = data.get("faq_count").and_then(Value::as_u64) {
            self.faq_count = Some(count);
        }
        if let Some(code) = data.get("embed_code").and_then(Value::as_str).filter(|c| !c.is_empty()) {
            self.embed_code = Some(code.to_owned());
        }
    }
}

impl Progress for BuilderProgress {
    const ERROR_FIELDS: &'static [&'static str] = &["detail", "message"];
    const GENERIC_ERROR: &'static str = "AI builder encountered an error.";

    /// Only `completed` and `error` end the build; stage failures such as
    /// `indexing_error` are reported but the build carries on.
    fn effect(kind: &str) -> KindEffect {
        match kind {
            "ping" => KindEffect::Keepalive,
            "completed" => KindEffect::Completed,
            "error" => KindEffect::Error,
            _ => KindEffect::Running,
        }
    }

    fn on_running(&mut self, frame: &StreamFrame) {
        self.note(frame);
    }

    fn on_completed(&mut self, frame: &StreamFrame) {
        self.note(frame);
    }

    fn on_error(&mut self, frame: &StreamFrame) {
        self.note(frame);
    }
}
