// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted key-value storage for session identifiers.
//!
//! The auth token, tenant, project, and widget identifiers live outside the
//! connection layer; every URL builder reads them through [`SessionStore`] and
//! fails fast when a required key is missing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{ErrorCode, WireError};
use crate::protocol::TypingRule;

pub const AUTH_TOKEN: &str = "auth_token";
pub const TENANT_ID: &str = "tenant_id";
pub const PROJECT_ID: &str = "project_id";
pub const USER_NAME: &str = "user_name";
pub const WIDGET_ID: &str = "widget_id";
pub const SESSION_TOKEN: &str = "session_token";

/// Key-value storage the connection layer reads identifiers from.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), WireError>;
    fn remove(&self, key: &str) -> Result<(), WireError>;

    /// Look up a key, treating an empty value as absent.
    fn require(&self, key: &str) -> Result<String, WireError> {
        self.get(key).filter(|v| !v.is_empty()).ok_or_else(|| WireError::missing(key))
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { entries: RwLock::new(map) }
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WireError> {
        self.entries.write().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), WireError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// JSON-object file on disk. A missing file reads as an empty store; every
/// mutation rewrites the whole file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WireError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(ErrorCode::Internal
                    .with_message(format!("failed to read {}: {e}", path.display())))
            }
        };
        Ok(Self { path, entries: RwLock::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), WireError> {
        let json = serde_json::to_string_pretty(entries)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ErrorCode::Internal
                        .with_message(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }
        std::fs::write(&self.path, json).map_err(|e| {
            ErrorCode::Internal.with_message(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), WireError> {
        let mut entries = self.entries.write();
        entries.insert(key.to_owned(), value.to_owned());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), WireError> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

/// Identifiers resolved for one push endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Agent console: one connection per agent across all chat sessions.
    Agent { token: String, tenant_id: String, user_name: Option<String> },
    /// Embeddable widget: one connection per visitor chat session.
    Widget { widget_id: String, session_token: String },
}

impl Credentials {
    pub fn agent(store: &dyn SessionStore) -> Result<Self, WireError> {
        Ok(Self::Agent {
            token: store.require(AUTH_TOKEN)?,
            tenant_id: store.require(TENANT_ID)?,
            user_name: store.get(USER_NAME).filter(|n| !n.is_empty()),
        })
    }

    pub fn widget(store: &dyn SessionStore) -> Result<Self, WireError> {
        Ok(Self::Widget {
            widget_id: store.require(WIDGET_ID)?,
            session_token: store.require(SESSION_TOKEN)?,
        })
    }

    /// Build the push-channel URL. The token travels as a query parameter
    /// (agent) or path segment (widget) because the handshake carries no headers.
    pub fn push_url(&self, ws_base: &str) -> String {
        let ws_base = ws_base.trim_end_matches('/');
        match self {
            Self::Agent { token, tenant_id, .. } => {
                format!("{ws_base}/tenants/{tenant_id}/chat/agent/ws?token={token}")
            }
            Self::Widget { widget_id, session_token } => {
                format!("{ws_base}/public/chat/ws/widgets/{widget_id}/chat/{session_token}")
            }
        }
    }

    /// Name of the local user, used to suppress self-typing notifications.
    pub fn local_user(&self) -> Option<&str> {
        match self {
            Self::Agent { user_name, .. } => user_name.as_deref(),
            Self::Widget { .. } => None,
        }
    }

    /// Typing indicators this client should surface. Agents hide their own;
    /// widget visitors only see agents typing.
    pub fn typing_rule(&self) -> TypingRule {
        match self {
            Self::Agent { user_name, .. } => TypingRule::ExceptSelf(user_name.clone()),
            Self::Widget { .. } => TypingRule::AgentsOnly,
        }
    }
}

/// Tenant and project scoping for knowledge-job endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectScope {
    pub token: String,
    pub tenant_id: String,
    pub project_id: String,
}

impl ProjectScope {
    pub fn load(store: &dyn SessionStore) -> Result<Self, WireError> {
        Ok(Self {
            token: store.require(AUTH_TOKEN)?,
            tenant_id: store.require(TENANT_ID)?,
            project_id: store.require(PROJECT_ID)?,
        })
    }

    /// `{api}/tenants/{t}/projects/{p}` prefix.
    pub fn project_url(&self, api_base: &str) -> String {
        format!(
            "{}/tenants/{}/projects/{}",
            api_base.trim_end_matches('/'),
            self.tenant_id,
            self.project_id
        )
    }

    pub fn knowledge_url(&self, api_base: &str) -> String {
        format!("{}/knowledge", self.project_url(api_base))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
