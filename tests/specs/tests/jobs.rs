// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming scrape and index jobs end to end.

use std::time::Duration;

use serde_json::json;

use deskwire::api::{BuildRequest, RestClient, ScrapeRequest};
use deskwire::error::ErrorCode;
use deskwire::progress::{
    drive_job, BuilderProgress, IndexProgress, JobObserver, JobStatus, ProgressMachine,
    ScrapeProgress, StageStatus, UNEXPECTED_END,
};
use deskwire::store::ProjectScope;
use deskwire_specs::{FakeBackend, PROJECT, TENANT};

const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Recorder {
    updates: usize,
    successes: usize,
    failures: Vec<String>,
}

impl<P> JobObserver<P> for Recorder {
    fn on_update(&mut self, _machine: &ProgressMachine<P>) {
        self.updates += 1;
    }

    fn on_success(&mut self, _machine: &ProgressMachine<P>) {
        self.successes += 1;
    }

    fn on_failure(&mut self, message: &str) {
        self.failures.push(message.to_owned());
    }
}

fn scope(backend: &FakeBackend) -> anyhow::Result<ProjectScope> {
    Ok(ProjectScope::load(backend.agent_store().as_ref())?)
}

#[tokio::test]
async fn scrape_job_runs_to_completion() -> anyhow::Result<()> {
    let backend = FakeBackend::builder()
        .scrape(&[
            ("job_created", json!({ "id": "job-1", "status": "pending" })),
            ("started", json!({ "job_id": "job-1", "max_depth": 2, "message": "crawling" })),
            ("link_found", json!({ "url": "https://docs.test/a", "links_found": 1, "current_depth": 1 })),
            ("ping", json!({ "message": "keepalive" })),
            ("link_found", json!({ "url": "https://docs.test/ü", "links_found": 3, "current_depth": 2 })),
            ("completed", json!({ "job_id": "job-1", "links_found": 3 })),
        ])
        .spawn()
        .await?;
    let rest = RestClient::new(&backend.api_url(), TIMEOUT);
    let request = ScrapeRequest::new("https://docs.test", Some(2))?;

    let stream = rest.open_scrape_stream(&scope(&backend)?, &request).await?;
    let mut machine = ProgressMachine::<ScrapeProgress>::new();
    let mut rec = Recorder::default();
    drive_job(stream, &mut machine, &mut rec).await?;

    assert_eq!(machine.status(), JobStatus::Completed);
    let p = machine.progress();
    assert_eq!(p.job_id.as_deref(), Some("job-1"));
    assert_eq!((p.links_found, p.current_depth, p.max_depth), (3, 2, 2));
    assert_eq!(machine.log().len(), 5);
    assert_eq!(machine.log()[3].url.as_deref(), Some("https://docs.test/ü"));
    assert_eq!(rec.successes, 1);
    assert!(rec.failures.is_empty());

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, json!({ "url": "https://docs.test", "max_depth": 2 }));
    Ok(())
}

#[tokio::test]
async fn index_job_with_capped_selection() -> anyhow::Result<()> {
    let backend = FakeBackend::builder()
        .links(json!({
            "links": [
                { "url": "https://docs.test/a", "title": "A", "depth": 1, "token_count": 100 },
                { "url": "https://docs.test/b", "depth": 1, "token_count": 150 },
                { "url": "https://docs.test/c", "depth": 2, "token_count": 90 },
            ],
            "max_selectable_links": 2,
        }))
        .index(&[
            ("started", json!({ "total": 2 })),
            ("embedding_started", json!({ "total": 2, "completed": 0, "pending": 2 })),
            ("embedding_completed", json!({ "completed": 1, "pending": 1, "total_tokens": 100 })),
            ("embedding_completed", json!({ "completed": 2, "pending": 0, "total_tokens": 250 })),
            ("completed", json!({ "completed": 2 })),
        ])
        .spawn()
        .await?;
    let rest = RestClient::new(&backend.api_url(), TIMEOUT);
    let scope = scope(&backend)?;

    let links = rest.job_links(&scope, "job-1").await?;
    assert_eq!(links.links.len(), 3);
    let mut selection = links.selection();
    let outcome = selection.select_all();
    assert_eq!((outcome.selected, outcome.dropped), (2, 1));

    let urls = selection.into_selected();
    let resp = rest.select_links(&scope, "job-1", &urls).await?;
    assert_eq!(resp.selected_count, 2);
    assert_eq!(resp.max_selectable_links, Some(2));

    let stream = rest.open_index_stream(&scope, "job-1").await?;
    let mut machine = ProgressMachine::<IndexProgress>::new();
    let mut rec = Recorder::default();
    drive_job(stream, &mut machine, &mut rec).await?;

    let p = machine.progress();
    assert_eq!((p.total, p.completed, p.pending, p.total_tokens), (2, 2, 0, 250));
    assert_eq!(rec.updates, 4);
    assert_eq!(rec.successes, 1);

    let paths: Vec<String> = backend.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/scraping-jobs/job-1/select-links", "/scraping-jobs/job-1/index/stream"]);
    assert_eq!(
        backend.requests()[0].body,
        json!({ "urls": ["https://docs.test/a", "https://docs.test/b"] })
    );
    Ok(())
}

#[tokio::test]
async fn stream_ending_early_fails_the_job() -> anyhow::Result<()> {
    let backend = FakeBackend::builder()
        .index(&[("started", json!({ "total": 3 }))])
        .spawn()
        .await?;
    let rest = RestClient::new(&backend.api_url(), TIMEOUT);

    let stream = rest.open_index_stream(&scope(&backend)?, "job-2").await?;
    let mut machine = ProgressMachine::<IndexProgress>::new();
    let mut rec = Recorder::default();
    let err = drive_job(stream, &mut machine, &mut rec).await.err();

    assert_eq!(err.map(|e| e.code), Some(ErrorCode::JobFailed));
    assert_eq!(machine.error(), Some(UNEXPECTED_END));
    assert_eq!(rec.failures, vec![UNEXPECTED_END.to_owned()]);
    Ok(())
}

#[tokio::test]
async fn job_error_event_carries_server_message() -> anyhow::Result<()> {
    let backend = FakeBackend::builder()
        .scrape(&[
            ("started", json!({})),
            ("error", json!({ "message": "robots.txt disallows crawling" })),
        ])
        .spawn()
        .await?;
    let rest = RestClient::new(&backend.api_url(), TIMEOUT);
    let request = ScrapeRequest::new("https://blocked.test", None)?;

    let stream = rest.open_scrape_stream(&scope(&backend)?, &request).await?;
    let mut machine = ProgressMachine::<ScrapeProgress>::new();
    let mut rec = Recorder::default();
    assert!(drive_job(stream, &mut machine, &mut rec).await.is_err());
    assert_eq!(machine.status(), JobStatus::Error);
    assert_eq!(rec.failures, vec!["robots.txt disallows crawling".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn wrong_token_is_an_http_status_error() -> anyhow::Result<()> {
    let backend = FakeBackend::builder().spawn().await?;
    let rest = RestClient::new(&backend.api_url(), TIMEOUT);
    let scope = ProjectScope {
        token: "wrong".to_owned(),
        tenant_id: TENANT.to_owned(),
        project_id: PROJECT.to_owned(),
    };

    let err = rest.open_index_stream(&scope, "job-1").await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::HttpStatus));
    let err = rest.job_links(&scope, "job-1").await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::HttpStatus));
    Ok(())
}

#[tokio::test]
async fn builder_run_reports_stages_and_artifacts() -> anyhow::Result<()> {
    let backend = FakeBackend::builder()
        .build(&[
            json!({ "type": "builder_started", "stage": "initialization", "message": "Starting" }),
            json!({ "type": "widget_ready", "stage": "widget", "message": "Widget ready" }),
            json!({
                "type": "knowledge_links_chosen",
                "stage": "scraping",
                "data": { "selected_links": [{ "url": "https://shop.test/faq" }] },
            }),
            json!({ "type": "indexing_completed", "stage": "indexing" }),
            json!({
                "type": "completed",
                "stage": "summary",
                "message": "AI builder completed successfully",
                "data": { "embed_code": "<script src=w.js></script>", "faq_count": 0 },
            }),
        ])
        .spawn()
        .await?;
    let rest = RestClient::new(&backend.api_url(), TIMEOUT);
    let request = BuildRequest::new("https://shop.test", None)?;

    let stream = rest.open_builder_stream(&scope(&backend)?, &request).await?;
    let mut machine = ProgressMachine::<BuilderProgress>::new();
    let mut rec = Recorder::default();
    drive_job(stream, &mut machine, &mut rec).await?;

    assert_eq!(machine.status(), JobStatus::Completed);
    let p = machine.progress();
    assert_eq!(p.stage("widget"), Some(StageStatus::Complete));
    assert_eq!(p.stage("scraping"), Some(StageStatus::Complete));
    assert_eq!(p.stage("indexing"), Some(StageStatus::Complete));
    assert_eq!(p.stage("faq"), Some(StageStatus::Pending));
    assert_eq!(p.selected_links.len(), 1);
    assert_eq!(p.faq_count, Some(0));
    assert_eq!(p.embed_code.as_deref(), Some("<script src=w.js></script>"));
    assert_eq!(rec.successes, 1);

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, json!({ "url": "https://shop.test", "max_depth": 3 }));
    Ok(())
}

#[tokio::test]
async fn builder_error_uses_detail() -> anyhow::Result<()> {
    let backend = FakeBackend::builder()
        .build(&[
            json!({ "type": "knowledge_stage_started", "stage": "scraping" }),
            json!({
                "type": "error",
                "stage": "scraping",
                "message": "Failed to crawl",
                "detail": "robots.txt disallows crawling",
            }),
        ])
        .spawn()
        .await?;
    let rest = RestClient::new(&backend.api_url(), TIMEOUT);
    let request = BuildRequest::new("https://shop.test", Some(2))?;

    let stream = rest.open_builder_stream(&scope(&backend)?, &request).await?;
    let mut machine = ProgressMachine::<BuilderProgress>::new();
    let mut rec = Recorder::default();
    let err = drive_job(stream, &mut machine, &mut rec).await.err();

    assert_eq!(err.map(|e| e.code), Some(ErrorCode::JobFailed));
    assert_eq!(rec.failures, vec!["robots.txt disallows crawling".to_owned()]);
    assert_eq!(machine.progress().stage("scraping"), Some(StageStatus::Error));
    Ok(())
}
