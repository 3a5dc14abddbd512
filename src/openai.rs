//! OpenAI Chat Completions backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::service::{AssistantTurn, ChatService, ServiceError};
use crate::tools::ToolSpec;
use crate::transcript::{ToolCallRequest, TranscriptEntry};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// [`ChatService`] implementation for OpenAI-compatible Chat Completions
/// APIs.
#[derive(Debug, Clone)]
pub struct OpenAiChatService {
    api_key: String,
    base_url: String,
    timeout: Option<Duration>,
}

impl OpenAiChatService {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }

    /// Point at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }

    fn handle_error_response(status: reqwest::StatusCode, body: &str) -> ServiceError {
        if let Ok(error_resp) = serde_json::from_str::<ChatErrorResponse>(body) {
            ServiceError::Provider(format!(
                "API error ({}): {}",
                error_resp.error.error_type, error_resp.error.message
            ))
        } else {
            ServiceError::Provider(format!("HTTP {status}: {body}"))
        }
    }
}

#[async_trait]
impl ChatService for OpenAiChatService {
    async fn complete(
        &self,
        model: &str,
        transcript: &[TranscriptEntry],
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, ServiceError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request_body = ChatRequest::new(model, transcript, tools);

        if let Ok(body) = serde_json::to_string_pretty(&request_body) {
            debug!("API request body ({} bytes):\n{}", body.len(), body);
        }

        let response = self
            .http_client()?
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!("API response ({} bytes):\n{}", body.len(), body);

        if !status.is_success() {
            return Err(Self::handle_error_response(status, &body));
        }

        let chat_response: ChatResponse = serde_json::from_str(&body)?;
        chat_response.into_turn()
    }
}

// --- Chat Completions wire types ---

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    tools: Option<Vec<ChatTool>>,
}

impl ChatRequest {
    fn new(model: &str, transcript: &[TranscriptEntry], tools: &[ToolSpec]) -> Self {
        let messages = transcript.iter().map(ChatMessage::from_entry).collect();

        let tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|spec| ChatTool {
                        tool_type: "function".to_string(),
                        function: ChatFunction {
                            name: spec.name.clone(),
                            description: Some(spec.description.clone()),
                            parameters: spec.parameters.to_json(),
                            strict: spec.parameters.is_strict().then_some(true),
                        },
                    })
                    .collect(),
            )
        };

        ChatRequest {
            model: model.to_string(),
            messages,
            tools,
        }
    }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn from_entry(entry: &TranscriptEntry) -> Self {
        match entry {
            TranscriptEntry::System { content } => ChatMessage {
                role: "system".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            TranscriptEntry::User { content } => ChatMessage {
                role: "user".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            TranscriptEntry::Assistant {
                content,
                tool_calls,
            } => ChatMessage {
                role: "assistant".to_string(),
                content: content.clone(),
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        tool_calls
                            .iter()
                            .map(|call| ChatToolCall {
                                id: call.call_id.clone(),
                                tool_type: "function".to_string(),
                                function: ChatFunctionCall {
                                    name: call.name.clone(),
                                    arguments: call.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: None,
            },
            TranscriptEntry::ToolResult { call_id, content } => ChatMessage {
                role: "tool".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(call_id.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatFunction,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
struct ChatFunction {
    name: String,
    description: Option<String>,
    parameters: serde_json::Value,
    strict: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn into_turn(mut self) -> Result<AssistantTurn, ServiceError> {
        if self.choices.is_empty() {
            return Err(ServiceError::Malformed("response had no choices".into()));
        }
        let message = self.choices.remove(0).message;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCallRequest::new(call.id, call.function.name, call.function.arguments))
            .collect();

        Ok(AssistantTurn {
            content: message.content.filter(|c| !c.is_empty()),
            tool_calls,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatErrorResponse {
    error: ChatError,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
