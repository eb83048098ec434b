// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line front end for the `deskwire` binary.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::api::{BuildRequest, RestClient, ScrapeRequest};
use crate::channel::AgentChannel;
use crate::config::WireConfig;
use crate::connection::{ConnectionState, Endpoint, Multiplexer, MuxOptions, Subscriber};
use crate::epoch_ms;
use crate::progress::{
    drive_job, BuilderProgress, IndexProgress, JobObserver, ProgressMachine, ScrapeProgress,
};
use crate::protocol::EventCategory;
use crate::selection::LinkSelection;
use crate::store::{
    Credentials, FileStore, MemoryStore, ProjectScope, SessionStore, AUTH_TOKEN, PROJECT_ID,
    SESSION_TOKEN, TENANT_ID, USER_NAME, WIDGET_ID,
};

/// Realtime client for the helpdesk API.
#[derive(Debug, clap::Parser)]
#[command(name = "deskwire", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub config: WireConfig,

    /// Log format (json or text).
    #[arg(long, env = "DESKWIRE_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Follow the agent push channel and print each event as a JSON line.
    Tail {
        /// Chat sessions to subscribe to once connected.
        #[arg(long = "session")]
        sessions: Vec<String>,
    },
    /// Send a chat message, falling back to REST when push is unavailable.
    Send {
        session: String,
        content: String,
        /// Project id (defaults to the stored project_id).
        #[arg(long)]
        project: Option<String>,
    },
    /// Start a scrape job and follow its progress.
    Scrape {
        url: String,
        #[arg(long)]
        max_depth: Option<u8>,
    },
    /// Build a chat widget and knowledge base from a website.
    Build {
        url: String,
        #[arg(long)]
        max_depth: Option<u8>,
    },
    /// List the links a scrape job discovered.
    Links { job: String },
    /// Select discovered links and follow the indexing job.
    Index {
        job: String,
        /// Links to select (ignored with --all).
        urls: Vec<String>,
        /// Select every discovered link up to the server's cap.
        #[arg(long)]
        all: bool,
    },
}

const STORE_KEYS: [&str; 6] = [AUTH_TOKEN, TENANT_ID, PROJECT_ID, USER_NAME, WIDGET_ID, SESSION_TOKEN];

/// Open the configured store, or an in-memory one seeded from
/// `DESKWIRE_<KEY>` environment variables.
pub fn open_store(config: &WireConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
    if let Some(ref path) = config.store {
        let store = FileStore::open(path)
            .with_context(|| format!("open store {}", path.display()))?;
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(MemoryStore::with(STORE_KEYS.iter().filter_map(|key| {
        std::env::var(env_key(key)).ok().map(|value| (*key, value))
    }))))
}

pub fn env_key(key: &str) -> String {
    format!("DESKWIRE_{}", key.to_uppercase())
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    crate::ensure_crypto();
    let config = cli.config;
    let store = open_store(&config)?;
    let rest = Arc::new(RestClient::from_config(&config));

    match cli.command {
        Command::Tail { sessions } => tail(&config, store, rest, &sessions).await,
        Command::Send { session, content, project } => {
            send(&config, store, rest, &session, &content, project).await
        }
        Command::Scrape { url, max_depth } => {
            let scope = ProjectScope::load(store.as_ref())?;
            let request = ScrapeRequest::new(&url, max_depth)?;
            let stream = rest.open_scrape_stream(&scope, &request).await?;
            let mut machine = ProgressMachine::<ScrapeProgress>::new();
            drive_job(stream, &mut machine, &mut ConsoleObserver::default()).await?;
            Ok(())
        }
        Command::Build { url, max_depth } => {
            let scope = ProjectScope::load(store.as_ref())?;
            let request = BuildRequest::new(&url, max_depth)?;
            let stream = rest.open_builder_stream(&scope, &request).await?;
            let mut machine = ProgressMachine::<BuilderProgress>::new();
            drive_job(stream, &mut machine, &mut ConsoleObserver::default()).await?;
            Ok(())
        }
        Command::Links { job } => {
            let scope = ProjectScope::load(store.as_ref())?;
            let links = rest.job_links(&scope, &job).await?;
            for link in &links.links {
                println!("{}", serde_json::to_string(link)?);
            }
            info!(count = links.links.len(), max = links.max_selectable_links, "links listed");
            Ok(())
        }
        Command::Index { job, urls, all } => index(store, rest, &job, &urls, all).await,
    }
}

// -- Push channel ------------------------------------------------------------

#[derive(Serialize)]
struct TailLine<'a, T: Serialize> {
    category: EventCategory,
    at_ms: u64,
    payload: &'a T,
}

fn emit<T: Serialize>(category: EventCategory, payload: &T) {
    let line = TailLine { category, at_ms: epoch_ms(), payload };
    match serde_json::to_string(&line) {
        Ok(text) => println!("{text}"),
        Err(e) => warn!(err = %e, "failed to render event"),
    }
}

fn printing_subscriber() -> Subscriber {
    Subscriber::new()
        .on_state(|s| eprintln!("status: {}", s.status_line()))
        .on_message(|v| emit(EventCategory::ChatMessage, v))
        .on_typing(|t| emit(EventCategory::Typing, t))
        .on_session_update(|v| emit(EventCategory::SessionUpdate, v))
        .on_notification(|v| emit(EventCategory::Notification, v))
        .on_alarm(|stage, v| emit(EventCategory::Alarm, &json!({ "stage": stage, "payload": v })))
        .on_agent_joined(|v| emit(EventCategory::AgentJoined, v))
        .on_read_receipt(|id| emit(EventCategory::ReadReceipt, &json!({ "message_id": id })))
        .on_error(|e| warn!(code = e.code.as_str(), err = %e, "push channel error"))
}

async fn tail(
    config: &WireConfig,
    store: Arc<dyn SessionStore>,
    rest: Arc<RestClient>,
    sessions: &[String],
) -> anyhow::Result<()> {
    Credentials::agent(store.as_ref())?;
    let mux = Multiplexer::websocket(MuxOptions::from_config(config, Endpoint::Agent), store);
    let channel = AgentChannel::new(mux.clone(), rest);
    let _sub = channel.subscribe(printing_subscriber());

    let mut rx = mux.watch();
    let mut was_connected = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = rx.borrow_and_update().clone();
                let connected = snap.is_connected();
                // Session subscriptions do not survive a reconnect.
                if connected && !was_connected {
                    for session in sessions {
                        channel.subscribe_session(session);
                    }
                }
                was_connected = connected;
                if snap.state == ConnectionState::Failed {
                    mux.disconnect();
                    anyhow::bail!("{}", snap.status_line());
                }
            }
        }
    }
    mux.disconnect();
    Ok(())
}

async fn send(
    config: &WireConfig,
    store: Arc<dyn SessionStore>,
    rest: Arc<RestClient>,
    session: &str,
    content: &str,
    project: Option<String>,
) -> anyhow::Result<()> {
    let project = project.or_else(|| store.get(PROJECT_ID)).unwrap_or_default();
    let mux = Multiplexer::websocket(MuxOptions::from_config(config, Endpoint::Agent), store);
    let channel = AgentChannel::new(mux.clone(), rest);
    let sub = channel.subscribe(Subscriber::new());

    // Give the push connection one chance to open before falling back.
    let mut rx = mux.watch();
    let settled = rx.wait_for(|s| {
        matches!(s.state, ConnectionState::Connected | ConnectionState::Reconnecting { .. })
    });
    let _ = tokio::time::timeout(config.request_timeout(), settled).await;

    let delivery = channel.send_chat_message(session, &project, content).await?;
    println!("{}", json!({ "session": session, "delivery": delivery }));
    sub.unsubscribe();
    mux.disconnect();
    Ok(())
}

// -- Jobs --------------------------------------------------------------------

/// Prints new timeline entries to stderr and the final progress to stdout.
#[derive(Default)]
struct ConsoleObserver {
    printed: usize,
}

impl ConsoleObserver {
    fn flush_log<P>(&mut self, machine: &ProgressMachine<P>) {
        for entry in machine.log().iter().skip(self.printed) {
            match entry.url {
                Some(ref url) => eprintln!("[{}] {} {url}", entry.kind, entry.message),
                None => eprintln!("[{}] {}", entry.kind, entry.message),
            }
        }
        self.printed = machine.log().len();
    }
}

impl<P: Serialize> JobObserver<P> for ConsoleObserver {
    fn on_update(&mut self, machine: &ProgressMachine<P>) {
        self.flush_log(machine);
    }

    fn on_success(&mut self, machine: &ProgressMachine<P>) {
        self.flush_log(machine);
        let summary = json!({ "status": machine.status(), "progress": machine.progress() });
        println!("{summary}");
    }

    fn on_failure(&mut self, message: &str) {
        eprintln!("job failed: {message}");
    }
}

/// Apply the command-line choice. Repeated urls select once.
fn choose_links(selection: &mut LinkSelection, urls: &[String], all: bool) -> anyhow::Result<()> {
    if all {
        let outcome = selection.select_all();
        if outcome.dropped > 0 {
            warn!(
                selected = outcome.selected,
                dropped = outcome.dropped,
                "selection capped at {} links",
                selection.max()
            );
        }
    } else {
        for url in urls {
            selection.select(url)?;
        }
    }
    if selection.is_empty() {
        anyhow::bail!("no links selected");
    }
    Ok(())
}

async fn index(
    store: Arc<dyn SessionStore>,
    rest: Arc<RestClient>,
    job: &str,
    urls: &[String],
    all: bool,
) -> anyhow::Result<()> {
    let scope = ProjectScope::load(store.as_ref())?;
    let links = rest.job_links(&scope, job).await?;
    let mut selection = links.selection();
    choose_links(&mut selection, urls, all)?;
    let selected = selection.into_selected();
    let resp = rest.select_links(&scope, job, &selected).await?;
    info!(selected = resp.selected_count, "{}", resp.message);

    let stream = rest.open_index_stream(&scope, job).await?;
    let mut machine = ProgressMachine::<IndexProgress>::new();
    drive_job(stream, &mut machine, &mut ConsoleObserver::default()).await?;
    Ok(())
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
