// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded selection over the links a scrape job discovered.

use indexmap::IndexSet;
use serde::Serialize;

use crate::error::{ErrorCode, WireError};

/// Cap applied when the server does not send one.
pub const DEFAULT_MAX_SELECTABLE: usize = 10;

/// Result of [`LinkSelection::select_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectAllOutcome {
    pub selected: usize,
    /// Discovered links left out because of the cap.
    pub dropped: usize,
}

/// Selection set that never exceeds `max` entries. Order follows discovery
/// order for `select_all` and toggle order otherwise.
#[derive(Debug, Clone)]
pub struct LinkSelection {
    discovered: IndexSet<String>,
    selected: IndexSet<String>,
    max: usize,
}

impl LinkSelection {
    pub fn new<I, S>(discovered: I, max: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            discovered: discovered.into_iter().map(Into::into).collect(),
            selected: IndexSet::new(),
            max,
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn discovered(&self) -> impl Iterator<Item = &str> {
        self.discovered.iter().map(String::as_str)
    }

    pub fn selected(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn is_selected(&self, url: &str) -> bool {
        self.selected.contains(url)
    }

    /// Flip `url`. Returns whether it is now selected. Selecting past the
    /// cap, or a link that was never discovered, is rejected.
    pub fn toggle(&mut self, url: &str) -> Result<bool, WireError> {
        if self.selected.shift_remove(url) {
            return Ok(false);
        }
        if !self.discovered.contains(url) {
            return Err(ErrorCode::Selection.with_message(format!("{url} was not discovered")));
        }
        if self.selected.len() >= self.max {
            return Err(ErrorCode::Selection
                .with_message(format!("at most {} links can be selected", self.max)));
        }
        self.selected.insert(url.to_owned());
        Ok(true)
    }

    /// Select `url` if it is not already selected. Returns whether it was
    /// newly added.
    pub fn select(&mut self, url: &str) -> Result<bool, WireError> {
        if self.selected.contains(url) {
            return Ok(false);
        }
        self.toggle(url)
    }

    /// Select discovered links in order up to the cap.
    pub fn select_all(&mut self) -> SelectAllOutcome {
        for url in &self.discovered {
            if self.selected.len() >= self.max {
                break;
            }
            self.selected.insert(url.clone());
        }
        SelectAllOutcome {
            selected: self.selected.len(),
            dropped: self.discovered.len().saturating_sub(self.selected.len()),
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn into_selected(self) -> Vec<String> {
        self.selected.into_iter().collect()
    }
}

#[cfg(test)]
#[path = "selection_tests.rs"]
mod tests;
