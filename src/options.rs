//! Configuration for a conversation run.

/// Options governing one conversation.
#[derive(Debug, Clone)]
pub struct ConversationOptions {
    /// Model identifier forwarded to the backend (e.g. "gpt-4o").
    pub model: String,

    /// Maximum number of service rounds before the run is failed.
    /// Guarantees liveness against a backend that requests tools forever.
    pub max_rounds: usize,

    /// Reject argument keys a tool schema does not declare, even for
    /// schemas that did not opt into strictness themselves.
    pub strict_arguments: bool,
}

impl ConversationOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_rounds: 8,
            strict_arguments: false,
        }
    }

    /// Set the round limit. Must be at least one.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Set strict argument validation.
    pub fn with_strict_arguments(mut self, strict: bool) -> Self {
        self.strict_arguments = strict;
        self
    }
}
