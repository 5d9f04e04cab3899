//! Per-agent working state: todo list and scratchpad.
//!
//! Both are private to the owning agent and rendered into its next prompt.

use std::collections::BTreeMap;

use super::{ErrorKind, OpError};

#[derive(Debug, Clone)]
struct TodoEntry {
    content: String,
    done: bool,
}

/// Numbered todo list. Ids are never reused within an agent's lifetime.
#[derive(Debug, Default)]
pub struct TodoList {
    entries: BTreeMap<u64, TodoEntry>,
    next_id: u64,
}

impl TodoList {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn add(&mut self, content: &str) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            TodoEntry {
                content: content.to_string(),
                done: false,
            },
        );
        id
    }

    /// Mark a todo completed. Completing an already-completed todo is
    /// idempotent and reports that fact.
    pub fn complete(&mut self, id: u64) -> Result<(String, bool), OpError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| OpError::new(ErrorKind::UnknownTodo, format!("Todo {id} not found")))?;
        let already_done = entry.done;
        entry.done = true;
        Ok((entry.content.clone(), already_done))
    }

    pub fn delete(&mut self, id: u64) -> Result<String, OpError> {
        self.entries
            .remove(&id)
            .map(|e| e.content)
            .ok_or_else(|| OpError::new(ErrorKind::UnknownTodo, format!("Todo {id} not found")))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn view_all(&self) -> String {
        if self.entries.is_empty() {
            return "Todo list is empty.".to_string();
        }
        let mut lines = vec!["Todo List:".to_string()];
        for (id, entry) in &self.entries {
            let marker = if entry.done { "[✓]" } else { "[ ]" };
            lines.push(format!("{marker} [{id}] {}", entry.content));
        }
        lines.join("\n")
    }
}

/// Append-only notes the agent keeps for itself across turns.
#[derive(Debug, Default)]
pub struct Scratchpad {
    notes: Vec<String>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a note, returning its 1-based number.
    pub fn add_note(&mut self, content: &str) -> usize {
        self.notes.push(content.to_string());
        self.notes.len()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn view_all(&self) -> String {
        if self.notes.is_empty() {
            return "Scratchpad is empty.".to_string();
        }
        let mut lines = vec!["Scratchpad Contents:".to_string()];
        for (i, note) in self.notes.iter().enumerate() {
            lines.push(format!("\n--- Note {} ---\n{note}", i + 1));
        }
        lines.join("\n")
    }
}
