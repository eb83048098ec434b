// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the helpdesk REST and job-stream endpoints.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::WireConfig;
use crate::error::{ErrorCode, WireError};
use crate::selection::{LinkSelection, DEFAULT_MAX_SELECTABLE};
use crate::store::ProjectScope;
use crate::stream::JobStream;

pub const MIN_SCRAPE_DEPTH: u8 = 1;
pub const MAX_SCRAPE_DEPTH: u8 = 5;

/// Body of a scrape job request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeRequest {
    pub url: String,
    pub max_depth: u8,
}

impl ScrapeRequest {
    /// Depth defaults to 1 and must be within 1..=5.
    pub fn new(url: &str, max_depth: Option<u8>) -> Result<Self, WireError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ErrorCode::Internal.with_message("scrape url is empty"));
        }
        let max_depth = max_depth.unwrap_or(MIN_SCRAPE_DEPTH);
        if !(MIN_SCRAPE_DEPTH..=MAX_SCRAPE_DEPTH).contains(&max_depth) {
            return Err(ErrorCode::Internal.with_message(format!(
                "max_depth must be between {MIN_SCRAPE_DEPTH} and {MAX_SCRAPE_DEPTH}, got {max_depth}"
            )));
        }
        Ok(Self { url: url.to_owned(), max_depth })
    }
}

/// Crawl depth the builder uses when none is given.
pub const DEFAULT_BUILD_DEPTH: u8 = 3;

/// Query of an AI builder run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRequest {
    pub url: String,
    pub max_depth: u8,
}

impl BuildRequest {
    /// The url must be absolute http(s); depth defaults to 3 and must be
    /// within 1..=5.
    pub fn new(url: &str, max_depth: Option<u8>) -> Result<Self, WireError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ErrorCode::Internal.with_message("builder url is empty"));
        }
        let parsed = reqwest::Url::parse(url).map_err(|e| {
            ErrorCode::Internal.with_message(format!("builder url {url} is invalid: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ErrorCode::Internal
                .with_message(format!("builder url must be http or https, got {}", parsed.scheme())));
        }
        let max_depth = max_depth.unwrap_or(DEFAULT_BUILD_DEPTH);
        if !(MIN_SCRAPE_DEPTH..=MAX_SCRAPE_DEPTH).contains(&max_depth) {
            return Err(ErrorCode::Internal.with_message(format!(
                "max_depth must be between {MIN_SCRAPE_DEPTH} and {MAX_SCRAPE_DEPTH}, got {max_depth}"
            )));
        }
        Ok(Self { url: url.to_owned(), max_depth })
    }
}

/// One discovered link as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPreview {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub depth: u64,
    #[serde(default)]
    pub token_count: u64,
    #[serde(default)]
    pub content_preview: Option<String>,
    #[serde(default)]
    pub selected: bool,
}

#[derive(Deserialize)]
struct LinksBody {
    #[serde(default)]
    links: Option<Vec<LinkPreview>>,
    #[serde(default)]
    max_selectable_links: Option<usize>,
}

/// Links discovered by a scrape job and the selection cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLinks {
    pub links: Vec<LinkPreview>,
    pub max_selectable_links: usize,
}

impl JobLinks {
    pub fn from_json(value: Value) -> Result<Self, WireError> {
        let body: LinksBody = serde_json::from_value(value)?;
        Ok(Self {
            links: body.links.unwrap_or_default(),
            max_selectable_links: body.max_selectable_links.unwrap_or(DEFAULT_MAX_SELECTABLE),
        })
    }

    /// Empty selection gate over these links.
    pub fn selection(&self) -> LinkSelection {
        LinkSelection::new(self.links.iter().map(|l| l.url.clone()), self.max_selectable_links)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectLinksResponse {
    #[serde(default)]
    pub selected_count: usize,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub max_selectable_links: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SelectLinksBody<'a> {
    urls: &'a [String],
}

#[derive(Debug, Serialize)]
struct ChatFallbackBody<'a> {
    content: &'a str,
    message_type: &'a str,
    user_name: &'a str,
}

/// HTTP client for one API base.
///
/// Plain requests use a bounded timeout; job streams use a second client
/// with only a connect timeout, since their bodies stay open for the life
/// of the job.
#[derive(Debug, Clone)]
pub struct RestClient {
    api_base: String,
    client: Client,
    stream_client: Client,
}

impl RestClient {
    pub fn new(api_base: &str, timeout: Duration) -> Self {
        crate::ensure_crypto();
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        let stream_client = Client::builder().connect_timeout(timeout).build().unwrap_or_default();
        Self { api_base: api_base.trim_end_matches('/').to_owned(), client, stream_client }
    }

    pub fn from_config(config: &WireConfig) -> Self {
        Self::new(config.api_base(), config.request_timeout())
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn chat_messages_url(&self, session_id: &str) -> String {
        format!("{}/chat/sessions/{session_id}/messages", self.api_base)
    }

    pub fn scrape_stream_url(&self, scope: &ProjectScope) -> String {
        format!("{}/scrape/stream", scope.knowledge_url(&self.api_base))
    }

    pub fn builder_stream_url(&self, scope: &ProjectScope) -> String {
        format!("{}/ai/build", scope.project_url(&self.api_base))
    }

    pub fn job_url(&self, scope: &ProjectScope, job_id: &str, leaf: &str) -> String {
        format!("{}/scraping-jobs/{job_id}/{leaf}", scope.knowledge_url(&self.api_base))
    }

    /// Request/response delivery of a chat message.
    pub async fn send_chat_message(
        &self,
        token: &str,
        session_id: &str,
        content: &str,
        user_name: &str,
    ) -> Result<Value, WireError> {
        let body = ChatFallbackBody { content: content.trim(), message_type: "text", user_name };
        let req = self.client.post(self.chat_messages_url(session_id)).bearer_auth(token).json(&body);
        let resp = req.send().await?.error_for_status()?;
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn job_links(&self, scope: &ProjectScope, job_id: &str) -> Result<JobLinks, WireError> {
        let req = self.client.get(self.job_url(scope, job_id, "links")).bearer_auth(&scope.token);
        let value: Value = req.send().await?.error_for_status()?.json().await?;
        JobLinks::from_json(value)
    }

    pub async fn select_links(
        &self,
        scope: &ProjectScope,
        job_id: &str,
        urls: &[String],
    ) -> Result<SelectLinksResponse, WireError> {
        let req = self
            .client
            .post(self.job_url(scope, job_id, "select-links"))
            .bearer_auth(&scope.token)
            .json(&SelectLinksBody { urls });
        Ok(req.send().await?.error_for_status()?.json().await?)
    }

    /// Start a scrape job and stream its discovery progress.
    pub async fn open_scrape_stream(
        &self,
        scope: &ProjectScope,
        request: &ScrapeRequest,
    ) -> Result<JobStream, WireError> {
        let req = self
            .stream_client
            .post(self.scrape_stream_url(scope))
            .bearer_auth(&scope.token)
            .json(request);
        JobStream::open(req).await
    }

    /// Run the AI builder for a website and stream its stages.
    pub async fn open_builder_stream(
        &self,
        scope: &ProjectScope,
        request: &BuildRequest,
    ) -> Result<JobStream, WireError> {
        let req = self
            .stream_client
            .get(self.builder_stream_url(scope))
            .bearer_auth(&scope.token)
            .query(request);
        JobStream::open(req).await
    }

    /// Stream indexing progress for a job whose links were selected.
    pub async fn open_index_stream(
        &self,
        scope: &ProjectScope,
        job_id: &str,
    ) -> Result<JobStream, WireError> {
        let req = self
            .stream_client
            .get(self.job_url(scope, job_id, "index/stream"))
            .bearer_auth(&scope.token);
        JobStream::open(req).await
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
