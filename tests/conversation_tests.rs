use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use convoke::{
    AssistantTurn, CancellationToken, ChatService, Conversation, ConversationError,
    ConversationOptions, ConversationState, ParamType, ParameterSchema, ServiceError, Tool,
    ToolCallRequest, ToolError, ToolRegistry, ToolSpec, TranscriptEntry,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted backend: hands out queued turns and captures every request.
struct MockService {
    responses: Mutex<Vec<Result<AssistantTurn, ServiceError>>>,
    requests: Mutex<Vec<Vec<TranscriptEntry>>>,
}

impl MockService {
    fn new(responses: Vec<Result<AssistantTurn, ServiceError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn scripted(turns: Vec<AssistantTurn>) -> Self {
        Self::new(turns.into_iter().map(Ok).collect())
    }

    fn captured(&self) -> Vec<Vec<TranscriptEntry>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatService for MockService {
    async fn complete(
        &self,
        _model: &str,
        transcript: &[TranscriptEntry],
        _tools: &[ToolSpec],
    ) -> Result<AssistantTurn, ServiceError> {
        self.requests.lock().unwrap().push(transcript.to_vec());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(ServiceError::Provider("no more mock responses".into()))
        } else {
            responses.remove(0)
        }
    }
}

/// Backend that requests the same tool call every round, forever.
struct InsistentService {
    rounds_served: Mutex<usize>,
}

#[async_trait]
impl ChatService for InsistentService {
    async fn complete(
        &self,
        _model: &str,
        _transcript: &[TranscriptEntry],
        _tools: &[ToolSpec],
    ) -> Result<AssistantTurn, ServiceError> {
        let mut served = self.rounds_served.lock().unwrap();
        *served += 1;
        Ok(AssistantTurn::tool_calls(vec![ToolCallRequest::new(
            format!("c{served}"),
            "get_weather",
            r#"{"latitude":48.85,"longitude":2.35}"#,
        )]))
    }
}

/// Backend that never answers; used to exercise cancellation.
struct StalledService;

#[async_trait]
impl ChatService for StalledService {
    async fn complete(
        &self,
        _model: &str,
        _transcript: &[TranscriptEntry],
        _tools: &[ToolSpec],
    ) -> Result<AssistantTurn, ServiceError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(AssistantTurn::text("too late"))
    }
}

/// Tool that never finishes; used to exercise cancellation mid-batch.
struct StalledTool;

#[async_trait]
impl Tool for StalledTool {
    async fn call(&self, _args: Map<String, Value>) -> Result<Value, ToolError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Value::Null)
    }
}

/// Stand-in for the weather tool: always 18.3 degrees.
struct FixedWeather;

#[async_trait]
impl Tool for FixedWeather {
    async fn call(&self, _args: Map<String, Value>) -> Result<Value, ToolError> {
        Ok(json!(18.3))
    }
}

fn weather_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolSpec::new(
                "get_weather",
                "Get current temperature for provided coordinates in celsius.",
                ParameterSchema::new()
                    .required("latitude", ParamType::Number)
                    .required("longitude", ParamType::Number)
                    .strict(true),
            ),
            Box::new(FixedWeather),
        )
        .unwrap();
    Arc::new(registry)
}

fn empty_registry() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::new())
}

fn options() -> ConversationOptions {
    ConversationOptions::new("gpt-4o")
}

#[tokio::test]
async fn zero_tools_one_round_reaches_done() {
    let service = MockService::scripted(vec![AssistantTurn::text("Hello there.")]);
    let mut conversation = Conversation::new(empty_registry(), options(), "Hi");

    let answer = conversation.run(&service).await.unwrap();

    assert_eq!(answer, "Hello there.");
    assert_eq!(conversation.state(), ConversationState::Done);
    assert_eq!(service.captured().len(), 1);
    assert_eq!(conversation.transcript().len(), 2);
}

#[tokio::test]
async fn weather_round_trip() {
    let service = MockService::scripted(vec![
        AssistantTurn::tool_calls(vec![ToolCallRequest::new(
            "c1",
            "get_weather",
            r#"{"latitude":48.85,"longitude":2.35}"#,
        )]),
        AssistantTurn::text("It's about 18.3°C in Paris."),
    ]);
    let mut conversation = Conversation::new(
        weather_registry(),
        options(),
        "What's the weather like in Paris today?",
    );

    let answer = conversation.run(&service).await.unwrap();
    assert_eq!(answer, "It's about 18.3°C in Paris.");
    assert_eq!(conversation.state(), ConversationState::Done);

    let entries = conversation.transcript().entries();
    assert!(entries.contains(&TranscriptEntry::ToolResult {
        call_id: "c1".into(),
        content: "18.3".into(),
    }));
}

#[tokio::test]
async fn invalid_arguments_are_fed_back_not_fatal() {
    let service = MockService::scripted(vec![
        AssistantTurn::tool_calls(vec![ToolCallRequest::new(
            "c1",
            "get_weather",
            r#"{"latitude":"not-a-number"}"#,
        )]),
        AssistantTurn::text("I could not look that up."),
    ]);
    let mut conversation = Conversation::new(weather_registry(), options(), "Weather in Paris?");

    let answer = conversation.run(&service).await.unwrap();
    assert_eq!(answer, "I could not look that up.");

    let result_content = conversation
        .transcript()
        .entries()
        .iter()
        .find_map(|e| match e {
            TranscriptEntry::ToolResult { content, .. } => Some(content.clone()),
            _ => None,
        })
        .expect("a tool result was appended");
    assert!(result_content.starts_with("error:"));
    assert!(result_content.contains("latitude"));
    assert!(result_content.contains("longitude"));
}

#[tokio::test]
async fn unknown_tool_never_aborts_the_loop() {
    let service = MockService::scripted(vec![
        AssistantTurn::tool_calls(vec![ToolCallRequest::new("c9", "get_stock_price", "{}")]),
        AssistantTurn::text("I don't have that tool."),
    ]);
    let mut conversation = Conversation::new(weather_registry(), options(), "AAPL price?");

    let answer = conversation.run(&service).await.unwrap();
    assert_eq!(answer, "I don't have that tool.");

    let entries = conversation.transcript().entries();
    assert!(entries.iter().any(|e| matches!(
        e,
        TranscriptEntry::ToolResult { call_id, content }
            if call_id == "c9" && content.contains("unknown tool")
    )));
}

#[tokio::test]
async fn every_request_in_a_batch_gets_exactly_one_result() {
    let calls: Vec<ToolCallRequest> = (1..=3)
        .map(|i| {
            ToolCallRequest::new(
                format!("c{i}"),
                "get_weather",
                r#"{"latitude":48.85,"longitude":2.35}"#,
            )
        })
        .collect();
    let service = MockService::scripted(vec![
        AssistantTurn::tool_calls(calls),
        AssistantTurn::text("done"),
    ]);
    let mut conversation = Conversation::new(weather_registry(), options(), "Weather, thrice");

    conversation.run(&service).await.unwrap();

    // All three results were appended before the second service call.
    let second_request = &service.captured()[1];
    let result_ids: Vec<&str> = second_request
        .iter()
        .filter_map(|e| match e {
            TranscriptEntry::ToolResult { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(result_ids, vec!["c1", "c2", "c3"]);
}

#[tokio::test]
async fn duplicate_call_ids_dispatch_once() {
    let service = MockService::scripted(vec![
        AssistantTurn::tool_calls(vec![
            ToolCallRequest::new("c1", "get_weather", r#"{"latitude":1.0,"longitude":2.0}"#),
            ToolCallRequest::new("c1", "get_weather", r#"{"latitude":3.0,"longitude":4.0}"#),
        ]),
        AssistantTurn::text("done"),
    ]);
    let mut conversation = Conversation::new(weather_registry(), options(), "Weather twice?");

    conversation.run(&service).await.unwrap();

    let result_count = conversation
        .transcript()
        .entries()
        .iter()
        .filter(|e| matches!(e, TranscriptEntry::ToolResult { .. }))
        .count();
    assert_eq!(result_count, 1);
}

#[tokio::test]
async fn earlier_entries_are_an_unchanged_prefix_of_later_requests() {
    let service = MockService::scripted(vec![
        AssistantTurn::tool_calls(vec![ToolCallRequest::new(
            "c1",
            "get_weather",
            r#"{"latitude":48.85,"longitude":2.35}"#,
        )]),
        AssistantTurn::text("done"),
    ]);
    let mut conversation = Conversation::new(weather_registry(), options(), "Weather?");

    conversation.run(&service).await.unwrap();

    let captured = service.captured();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[1][..captured[0].len()], captured[0][..]);
    assert_eq!(
        conversation.transcript().entries()[..captured[1].len()],
        captured[1][..]
    );
}

#[tokio::test]
async fn round_limit_fails_after_exactly_max_rounds() {
    init_tracing();
    let service = InsistentService {
        rounds_served: Mutex::new(0),
    };
    let mut conversation = Conversation::new(
        weather_registry(),
        options().with_max_rounds(3),
        "Weather forever",
    );

    let err = conversation.run(&service).await.unwrap_err();
    assert!(matches!(err, ConversationError::RoundLimitExceeded(3)));
    assert_eq!(conversation.state(), ConversationState::Failed);
    assert_eq!(*service.rounds_served.lock().unwrap(), 3);
}

#[tokio::test]
async fn service_error_fails_the_conversation() {
    let service = MockService::new(vec![Err(ServiceError::Provider("rate limited".into()))]);
    let mut conversation = Conversation::new(empty_registry(), options(), "Hi");

    let err = conversation.run(&service).await.unwrap_err();
    assert!(matches!(err, ConversationError::Service(_)));
    assert_eq!(conversation.state(), ConversationState::Failed);
    // Nothing beyond the seed was appended.
    assert_eq!(conversation.transcript().len(), 1);
}

#[tokio::test]
async fn empty_assistant_turn_is_malformed() {
    let service = MockService::scripted(vec![AssistantTurn::default()]);
    let mut conversation = Conversation::new(empty_registry(), options(), "Hi");

    let err = conversation.run(&service).await.unwrap_err();
    assert!(matches!(
        err,
        ConversationError::Service(ServiceError::Malformed(_))
    ));
}

#[tokio::test]
async fn cancellation_interrupts_the_service_call_and_appends_nothing() {
    let cancel = CancellationToken::new();
    let mut conversation = Conversation::new(empty_registry(), options(), "Hi");

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = conversation
        .run_with_cancel(&StalledService, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ConversationError::Cancelled));
    assert_eq!(conversation.state(), ConversationState::Failed);
    assert_eq!(conversation.transcript().len(), 1);
}

#[tokio::test]
async fn cancellation_mid_batch_discards_partial_tool_results() {
    init_tracing();
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolSpec::new("stalled", "Never finishes.", ParameterSchema::new()),
            Box::new(StalledTool),
        )
        .unwrap();
    let service = MockService::scripted(vec![
        AssistantTurn::tool_calls(vec![ToolCallRequest::new("c1", "stalled", "{}")]),
        AssistantTurn::text("unreachable"),
    ]);

    let cancel = CancellationToken::new();
    let mut conversation = Conversation::new(Arc::new(registry), options(), "Stall, please");

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = conversation
        .run_with_cancel(&service, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ConversationError::Cancelled));
    assert_eq!(conversation.state(), ConversationState::Failed);

    // The assistant turn that requested the batch stays; no result for the
    // cancelled dispatch was appended.
    let entries = conversation.transcript().entries();
    assert_eq!(entries.len(), 2);
    assert!(matches!(entries[1], TranscriptEntry::Assistant { .. }));
    assert!(!entries
        .iter()
        .any(|e| matches!(e, TranscriptEntry::ToolResult { .. })));
}

#[tokio::test]
#[should_panic(expected = "system prompt must be seeded before the first round")]
async fn system_prompt_cannot_be_seeded_after_a_round() {
    let service = MockService::scripted(vec![AssistantTurn::text("done")]);
    let mut conversation = Conversation::new(empty_registry(), options(), "Hi");

    conversation.run(&service).await.unwrap();
    let _ = conversation.with_system("too late");
}

#[tokio::test]
async fn finished_conversations_issue_no_further_calls() {
    let service = MockService::scripted(vec![AssistantTurn::text("done")]);
    let mut conversation = Conversation::new(empty_registry(), options(), "Hi");

    conversation.run(&service).await.unwrap();
    let err = conversation.run(&service).await.unwrap_err();

    assert!(matches!(err, ConversationError::Finished));
    assert_eq!(service.captured().len(), 1);
}

#[tokio::test]
async fn system_prompt_precedes_the_user_turn() {
    let service = MockService::scripted(vec![AssistantTurn::text("ok")]);
    let mut conversation = Conversation::new(empty_registry(), options(), "Hi")
        .with_system("You are a weather assistant.");

    conversation.run(&service).await.unwrap();

    let first_request = &service.captured()[0];
    assert!(matches!(first_request[0], TranscriptEntry::System { .. }));
    assert!(matches!(first_request[1], TranscriptEntry::User { .. }));
}

#[test]
fn option_defaults_and_builders() {
    let options = ConversationOptions::new("gpt-4o");
    assert_eq!(options.max_rounds, 8);
    assert!(!options.strict_arguments);

    let options = options.with_max_rounds(0).with_strict_arguments(true);
    assert_eq!(options.max_rounds, 1);
    assert!(options.strict_arguments);
}
