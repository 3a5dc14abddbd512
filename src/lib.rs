//! # convoke - Tool-Calling Orchestrator
//!
//! A small, pragmatic library that mediates a multi-turn dialogue between a
//! chat backend and a set of locally registered tools, so the model can
//! request real-world actions and fold their results into its final answer.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Declarative tool schemas with dispatch-time argument validation
//! - Append-only transcript owned by each conversation
//! - Bounded orchestration loop with external cancellation
//! - OpenAI-compatible Chat Completions backend
//!
//! ## Architecture
//!
//! 1. **`ToolRegistry`** maps tool names to schemas and implementations.
//! 2. **`dispatch`** validates a model-issued call and routes it to the
//!    registered implementation, folding failures into results the model
//!    can read.
//! 3. **`Conversation`** owns the transcript and drives the round loop
//!    against a [`ChatService`] until the model answers, the round limit is
//!    hit, or the run is cancelled.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use convoke::openai::OpenAiChatService;
//! use convoke::weather::register_weather_tools;
//! use convoke::{Conversation, ConversationOptions, ToolRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = ToolRegistry::new();
//!     register_weather_tools(&mut registry)?;
//!
//!     let service = OpenAiChatService::new(std::env::var("OPENAI_API_KEY")?);
//!     let options = ConversationOptions::new("gpt-4o");
//!
//!     let mut conversation = Conversation::new(
//!         Arc::new(registry),
//!         options,
//!         "What's the weather like in Paris today?",
//!     );
//!
//!     let answer = conversation.run(&service).await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod conversation;
pub mod dispatch;
pub mod openai;
pub mod options;
pub mod service;
pub mod tools;
pub mod transcript;
pub mod weather;

pub use cancel::CancellationToken;
pub use conversation::{Conversation, ConversationError, ConversationState};
pub use dispatch::{dispatch, ToolCallResult, ToolFailure};
pub use options::ConversationOptions;
pub use service::{AssistantTurn, ChatService, ServiceError};
pub use tools::{
    ParamType, ParameterSchema, RegistryError, Tool, ToolError, ToolRegistry, ToolSpec,
};
pub use transcript::{ToolCallRequest, Transcript, TranscriptEntry};
