//! Conversation transcript: an ordered, append-only log of turns.
//!
//! The transcript is the shared state threaded through every round of model
//! interaction. Entries are immutable once appended; nothing is ever edited
//! or removed. Ordering is what lets the model correlate tool results with
//! the requests that produced them.

use serde::{Deserialize, Serialize};

/// A single tool invocation requested by the model within one assistant turn.
///
/// The `call_id` is an opaque token the backend uses to correlate this
/// request with its eventual result. `arguments` is the raw serialized
/// payload exactly as the model produced it; validation happens in the
/// dispatcher, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One turn contributed by a single party.
///
/// An assistant turn may carry free text, tool-call requests, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TranscriptEntry {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult {
        call_id: String,
        content: String,
    },
}

/// Append-only sequence of [`TranscriptEntry`] values.
///
/// Owned exclusively by one conversation; the only mutation it offers is
/// appending a new entry at the end.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry. There is no way to edit or remove it afterwards.
    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    /// Seed a system turn ahead of the opening user turn.
    ///
    /// Only valid before the first round has run; once assistant turns
    /// exist the transcript is strictly append-only and prepending would
    /// reorder history.
    pub(crate) fn prepend_system(&mut self, content: impl Into<String>) {
        let seeded_only = self
            .entries
            .iter()
            .all(|e| matches!(e, TranscriptEntry::System { .. } | TranscriptEntry::User { .. }));
        debug_assert!(
            seeded_only,
            "system prompt must be seeded before the first round"
        );
        if seeded_only {
            self.entries.insert(
                0,
                TranscriptEntry::System {
                    content: content.into(),
                },
            );
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
