//! The knowledge base: a virtual file system of everything the agent knows
//! about the user and their portfolio.
//!
//! Two-tier presence: every entry always projects its one-line summary into
//! the rendered context block; content is loaded on demand and demoted back
//! to summary-only when a turn ends without referencing it. A small set of
//! always-present keys is computed at hydrate time and stays protected for
//! the whole turn.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use rv_domain::{Error, Result};

use crate::runtime::state::{Focus, TodoItem, TodoStatus};

/// Marker tag of the context-refresh system message.
pub const CONTEXT_MESSAGE_TAG: &str = "context_refresh";

/// Where an entry's content can be (re)fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeSource {
    Store,
    Tool,
    Pipeline,
}

/// A single entry in the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Always projected into the context block.
    pub summary: String,
    /// `None` = indexed but not loaded.
    pub content: Option<String>,
    pub lines_loaded: usize,
    pub total_lines: usize,
    pub source: KnowledgeSource,
}

impl KnowledgeEntry {
    pub fn is_loaded(&self) -> bool {
        self.content.is_some()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.content.is_some() && self.lines_loaded >= self.total_lines
    }
}

fn line_count(content: &str) -> usize {
    content.lines().count().max(1)
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: BTreeMap<String, KnowledgeEntry>,
    /// Always-present keys in declared render order; immutable for the turn.
    always_present: Vec<String>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the always-present key set for this turn (declared order).
    pub fn set_always_present(&mut self, keys: Vec<String>) {
        self.always_present = keys;
    }

    pub fn protected_keys(&self) -> BTreeSet<String> {
        self.always_present.iter().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<&KnowledgeEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Index an entry with summary only (available tier).
    pub fn insert_summary(
        &mut self,
        key: impl Into<String>,
        summary: impl Into<String>,
        source: KnowledgeSource,
    ) {
        let summary = summary.into();
        self.entries.insert(
            key.into(),
            KnowledgeEntry {
                total_lines: line_count(&summary),
                summary,
                content: None,
                lines_loaded: 0,
                source,
            },
        );
    }

    /// Create or replace an entry. A `None` summary preserves the existing
    /// one (or falls back to the key for brand-new entries).
    pub fn write(
        &mut self,
        key: impl Into<String>,
        summary: Option<String>,
        content: Option<String>,
        source: KnowledgeSource,
    ) {
        let key = key.into();
        let summary = summary
            .or_else(|| self.entries.get(&key).map(|e| e.summary.clone()))
            .unwrap_or_else(|| key.clone());

        let (lines_loaded, total_lines) = match &content {
            Some(c) => {
                let lines = line_count(c);
                (lines, lines)
            }
            None => (0, line_count(&summary)),
        };

        self.entries.insert(
            key,
            KnowledgeEntry {
                summary,
                content,
                lines_loaded,
                total_lines,
                source,
            },
        );
    }

    /// Record freshly fetched content for an existing entry, honoring the
    /// requested line range. Entries below `min_lines_for_partial` always
    /// load fully. Returns the text that should be shown to the caller.
    pub fn apply_loaded_content(
        &mut self,
        key: &str,
        full_content: &str,
        start_line: Option<usize>,
        num_lines: Option<usize>,
        min_lines_for_partial: usize,
    ) -> Result<String> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| Error::UnknownKey(key.to_string()))?;

        let lines: Vec<&str> = full_content.lines().collect();
        let total = lines.len().max(1);

        let want_partial =
            num_lines.is_some() && lines.len() >= min_lines_for_partial;

        if want_partial {
            let start = start_line.unwrap_or(0).min(lines.len());
            let count = num_lines.unwrap_or(lines.len());
            let slice = lines[start..(start + count).min(lines.len())].join("\n");
            entry.content = Some(slice.clone());
            entry.lines_loaded = slice.lines().count().max(1).min(total);
            entry.total_lines = total;
            Ok(slice)
        } else {
            entry.content = Some(full_content.to_string());
            entry.lines_loaded = total;
            entry.total_lines = total;
            Ok(full_content.to_string())
        }
    }

    /// Drop an entry's content back to summary-only. The entry stays
    /// indexed; the summary survives untouched.
    pub fn offload(&mut self, key: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| Error::UnknownKey(key.to_string()))?;
        entry.content = None;
        entry.lines_loaded = 0;
        Ok(())
    }

    /// Delete an entry entirely. Always-present keys are protected for the
    /// whole turn.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        if self.always_present.iter().any(|k| k == key) {
            return Err(Error::ProtectedKey(key.to_string()));
        }
        self.entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::UnknownKey(key.to_string()))
    }

    /// Offload every loaded entry that this turn neither referenced nor
    /// protects. Idempotent: a second application changes nothing.
    pub fn demote_stale(&mut self, referenced: &BTreeSet<String>) {
        let protected = self.protected_keys();
        for (key, entry) in self.entries.iter_mut() {
            if entry.content.is_some() && !referenced.contains(key) && !protected.contains(key) {
                entry.content = None;
                entry.lines_loaded = 0;
            }
        }
    }

    // ── Rendering ──────────────────────────────────────────────────

    /// Render the context block: always-present keys first in declared
    /// order, then available keys alphabetically (path keys group by
    /// prefix). This ordering is a contract.
    pub fn render(&self, todos: &[TodoItem], focus: Option<&Focus>) -> String {
        let mut out = String::from("## Current State\n\n### Knowledge Base\n");

        if self.entries.is_empty() {
            out.push_str("  (vazio)\n");
        } else {
            for key in &self.always_present {
                if let Some(entry) = self.entries.get(key) {
                    out.push_str(&render_line(key, entry));
                }
            }
            for (key, entry) in &self.entries {
                if !self.always_present.iter().any(|k| k == key) {
                    out.push_str(&render_line(key, entry));
                }
            }
        }

        if !todos.is_empty() {
            out.push_str("\n### Tasks\n");
            for todo in todos {
                let mark = match todo.status {
                    TodoStatus::Pending => "[ ]",
                    TodoStatus::Done => "[x]",
                };
                out.push_str(&format!("  {mark} ({}) {}\n", todo.id, todo.task));
            }
        }

        if let Some(focus) = focus {
            out.push_str(&format!(
                "\n### Current Focus\n  Property: {} | Topic: {} | Depth: {}\n",
                focus.property_id, focus.topic, focus.depth
            ));
        }

        out.trim_end().to_string()
    }
}

fn render_line(key: &str, entry: &KnowledgeEntry) -> String {
    let status = if entry.is_loaded() { "loaded" } else { "available" };
    format!("  {key} [{status}] — {}\n", entry.summary)
}
