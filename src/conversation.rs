//! The orchestration loop: a bounded state machine over one transcript.
//!
//! Each round sends the full transcript plus tool declarations to the chat
//! backend, then either finishes with the assistant's text or dispatches the
//! requested tool calls, appends their results, and goes around again. Tool
//! failures are folded into results and fed back to the model; only service
//! failures and the round limit terminate the loop.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::dispatch::dispatch;
use crate::options::ConversationOptions;
use crate::service::{ChatService, ServiceError};
use crate::tools::ToolRegistry;
use crate::transcript::{ToolCallRequest, Transcript, TranscriptEntry};

/// Lifecycle of a conversation. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    AwaitingModel,
    ProcessingToolCalls,
    Done,
    Failed,
}

/// Errors that terminate a conversation.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("round limit of {0} exceeded")]
    RoundLimitExceeded(usize),

    #[error("conversation cancelled")]
    Cancelled,

    #[error("conversation already finished")]
    Finished,
}

/// One run-scoped dialogue between a user, a chat backend, and the tools in
/// a shared registry.
///
/// Owns its [`Transcript`] exclusively; the registry is read-only and may be
/// shared across concurrent conversations. A conversation is discarded when
/// the interaction concludes; nothing is retained across runs.
pub struct Conversation {
    id: Uuid,
    registry: Arc<ToolRegistry>,
    options: ConversationOptions,
    transcript: Transcript,
    state: ConversationState,
}

impl Conversation {
    /// Create a conversation seeded with one user message.
    pub fn new(
        registry: Arc<ToolRegistry>,
        options: ConversationOptions,
        user_message: impl Into<String>,
    ) -> Self {
        let mut transcript = Transcript::new();
        transcript.push(TranscriptEntry::User {
            content: user_message.into(),
        });
        Self {
            id: Uuid::new_v4(),
            registry,
            options,
            transcript,
            state: ConversationState::AwaitingModel,
        }
    }

    /// Seed a system prompt ahead of the user message.
    pub fn with_system(mut self, content: impl Into<String>) -> Self {
        self.transcript.prepend_system(content);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Drive the loop to completion, returning the final assistant text.
    pub async fn run<S: ChatService>(&mut self, service: &S) -> Result<String, ConversationError> {
        self.run_with_cancel(service, &CancellationToken::new())
            .await
    }

    /// Drive the loop to completion with an external cancellation signal.
    ///
    /// Cancellation interrupts an in-flight service call or dispatch batch;
    /// partially completed tool results for a cancelled round are discarded,
    /// never appended, so the transcript cannot end up with dangling call
    /// identifiers.
    pub async fn run_with_cancel<S: ChatService>(
        &mut self,
        service: &S,
        cancel: &CancellationToken,
    ) -> Result<String, ConversationError> {
        if matches!(
            self.state,
            ConversationState::Done | ConversationState::Failed
        ) {
            return Err(ConversationError::Finished);
        }

        debug!(conversation = %self.id, model = %self.options.model, "starting conversation loop");

        for round in 1..=self.options.max_rounds {
            self.state = ConversationState::AwaitingModel;
            let declarations = self.registry.describe_all();
            debug!(round, tools = declarations.len(), "requesting completion");

            let completion = tokio::select! {
                _ = cancel.cancelled() => None,
                result = service.complete(
                    &self.options.model,
                    self.transcript.entries(),
                    &declarations,
                ) => Some(result),
            };
            let turn = match completion {
                None => return self.fail(ConversationError::Cancelled),
                Some(Err(err)) => return self.fail(err.into()),
                Some(Ok(turn)) => turn,
            };

            if turn.tool_calls.is_empty() {
                return match turn.content {
                    Some(content) if !content.is_empty() => {
                        self.transcript.push(TranscriptEntry::Assistant {
                            content: Some(content.clone()),
                            tool_calls: Vec::new(),
                        });
                        self.state = ConversationState::Done;
                        info!(conversation = %self.id, round, "conversation complete");
                        Ok(content)
                    }
                    _ => self.fail(
                        ServiceError::Malformed(
                            "assistant turn had neither content nor tool calls".into(),
                        )
                        .into(),
                    ),
                };
            }

            self.transcript.push(TranscriptEntry::Assistant {
                content: turn.content.clone(),
                tool_calls: turn.tool_calls.clone(),
            });
            self.state = ConversationState::ProcessingToolCalls;

            // At most one dispatch per call identifier; the first request
            // with a given id wins.
            let mut seen = HashSet::new();
            let requests: Vec<&ToolCallRequest> = turn
                .tool_calls
                .iter()
                .filter(|call| seen.insert(call.call_id.as_str()))
                .collect();

            info!(round, calls = requests.len(), "dispatching tool calls");
            let strict = self.options.strict_arguments;
            let batch = join_all(
                requests
                    .iter()
                    .map(|request| dispatch(request, &self.registry, strict)),
            );

            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                results = batch => Some(results),
            };
            let Some(results) = outcome else {
                return self.fail(ConversationError::Cancelled);
            };

            // The batch is fully resolved before anything is appended, so
            // the append stays serialized and ordering is reproducible.
            for result in results {
                self.transcript.push(TranscriptEntry::ToolResult {
                    call_id: result.call_id.clone(),
                    content: result.content(),
                });
            }
        }

        warn!(conversation = %self.id, max_rounds = self.options.max_rounds, "round limit exceeded");
        self.fail(ConversationError::RoundLimitExceeded(
            self.options.max_rounds,
        ))
    }

    fn fail(&mut self, err: ConversationError) -> Result<String, ConversationError> {
        self.state = ConversationState::Failed;
        Err(err)
    }
}
