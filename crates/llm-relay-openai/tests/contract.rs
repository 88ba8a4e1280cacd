//! Contract tests for both `OpenAI` adapters against a mock server.

use std::sync::{Arc, Mutex};

use llm_relay_core::test_helpers::{
    assert_lawful, collect_events, count_to_three, final_message, sample_model, sse_data,
    sse_named, text_deltas,
};
use llm_relay_core::{ApiKind, CacheRetention, EnvDefaults, StopReason, StreamOptions};
use llm_relay_openai::{OpenAiCompletionsProvider, OpenAiResponsesProvider};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn sse(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn responses_body() -> String {
    let delta = |text: &str| {
        (
            "response.output_text.delta",
            json!({"type": "response.output_text.delta", "output_index": 0, "content_index": 0, "delta": text}),
        )
    };
    sse_named(&[
        ("response.created", json!({"type": "response.created", "response": {"id": "resp_1", "status": "in_progress"}})),
        ("response.output_item.added", json!({"type": "response.output_item.added", "output_index": 0, "item": {"type": "message", "id": "msg_1", "role": "assistant", "content": []}})),
        delta("1, "),
        delta("2, "),
        delta("3"),
        ("response.output_item.done", json!({"type": "response.output_item.done", "output_index": 0, "item": {"type": "message", "id": "msg_1", "role": "assistant", "content": [{"type": "output_text", "text": "1, 2, 3"}]}})),
        ("response.completed", json!({"type": "response.completed", "response": {"id": "resp_1", "status": "completed", "usage": {"input_tokens": 12, "output_tokens": 6, "input_tokens_details": {"cached_tokens": 2}}}})),
    ])
}

fn completions_body() -> String {
    let chunk = |delta: Value, finish: Value| {
        json!({"id": "chatcmpl-1", "object": "chat.completion.chunk", "choices": [{"index": 0, "delta": delta, "finish_reason": finish}]})
    };
    let mut body = sse_data(&[
        chunk(json!({"role": "assistant", "content": ""}), Value::Null),
        chunk(json!({"content": "1, "}), Value::Null),
        chunk(json!({"content": "2, "}), Value::Null),
        chunk(json!({"content": "3"}), Value::Null),
        chunk(json!({}), json!("stop")),
        json!({"id": "chatcmpl-1", "choices": [], "usage": {"prompt_tokens": 10, "completion_tokens": 6, "total_tokens": 16}}),
    ]);
    body.push_str("data: [DONE]\n\n");
    body
}

fn with_key() -> StreamOptions {
    StreamOptions {
        api_key: Some("sk-test".into()),
        ..Default::default()
    }
}

fn recorder() -> (Arc<Mutex<Option<Value>>>, StreamOptions) {
    let seen: Arc<Mutex<Option<Value>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let options = StreamOptions {
        on_payload: Some(Arc::new(move |body: &Value| {
            *sink.lock().unwrap() = Some(body.clone());
        })),
        ..with_key()
    };
    (seen, options)
}

// ── Responses ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_responses_count_to_three() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(sse(responses_body()))
        .expect(1)
        .mount(&server)
        .await;

    let model = sample_model(ApiKind::OpenAiResponses, &format!("{}/v1", server.uri()));
    let events = collect_events(OpenAiResponsesProvider::default().stream(
        &model,
        &count_to_three(),
        &with_key(),
        &EnvDefaults::default(),
    ))
    .await;

    assert_lawful(&events);
    assert_eq!(text_deltas(&events), "1, 2, 3");
    let message = final_message(&events);
    assert_eq!(message.stop_reason, StopReason::Stop);
    assert_eq!(message.response_id.as_deref(), Some("resp_1"));
    assert_eq!(message.usage.input, 10);
    assert_eq!(message.usage.cache_read, 2);
    assert_eq!(message.usage.output, 6);
    assert_eq!(message.usage.total_tokens, 18);
}

#[tokio::test]
async fn test_responses_long_retention_on_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse(responses_body()))
        .mount(&server)
        .await;

    let (seen, options) = recorder();
    let options = StreamOptions {
        cache_retention: Some(CacheRetention::Long),
        session_id: Some("session-7".into()),
        ..options
    };
    let model = sample_model(ApiKind::OpenAiResponses, &server.uri());
    let events = collect_events(OpenAiResponsesProvider::default().stream(
        &model,
        &count_to_three(),
        &options,
        &EnvDefaults::default(),
    ))
    .await;
    assert_eq!(events.last().unwrap().kind(), "done");

    let body = seen.lock().unwrap().clone().unwrap();
    assert_eq!(body["prompt_cache_key"], "session-7");
    assert_eq!(body["prompt_cache_retention"], "24h");

    let received: Vec<Request> = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(sent, body);
}

#[tokio::test]
async fn test_responses_truncated_stream_is_error() {
    let server = MockServer::start().await;
    let body = sse_named(&[(
        "response.created",
        json!({"type": "response.created", "response": {"id": "resp_1"}}),
    )]);
    Mock::given(method("POST"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let model = sample_model(ApiKind::OpenAiResponses, &server.uri());
    let events = collect_events(OpenAiResponsesProvider::default().stream(
        &model,
        &count_to_three(),
        &with_key(),
        &EnvDefaults::default(),
    ))
    .await;
    assert_lawful(&events);
    let message = final_message(&events);
    assert_eq!(message.stop_reason, StopReason::Error);
    assert!(message.error_message.as_deref().unwrap().contains("response.completed"));
}

#[tokio::test]
async fn test_responses_rate_limit_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}
        })))
        .mount(&server)
        .await;

    let model = sample_model(ApiKind::OpenAiResponses, &server.uri());
    let events = collect_events(OpenAiResponsesProvider::default().stream(
        &model,
        &count_to_three(),
        &with_key(),
        &EnvDefaults::default(),
    ))
    .await;
    let message = final_message(&events);
    assert_eq!(message.stop_reason, StopReason::Error);
    assert!(message.error_message.as_deref().unwrap().contains("Rate limit reached"));
}

// ── Chat completions ────────────────────────────────────────────────

#[tokio::test]
async fn test_completions_count_to_three() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(sse(completions_body()))
        .expect(1)
        .mount(&server)
        .await;

    let model = sample_model(ApiKind::OpenAiCompletions, &format!("{}/v1", server.uri()));
    let events = collect_events(OpenAiCompletionsProvider::default().stream(
        &model,
        &count_to_three(),
        &with_key(),
        &EnvDefaults::default(),
    ))
    .await;

    assert_lawful(&events);
    assert_eq!(text_deltas(&events), "1, 2, 3");
    let message = final_message(&events);
    assert_eq!(message.stop_reason, StopReason::Stop);
    assert_eq!(message.usage.total_tokens, 16);
    // 10 in at $1/M + 6 out at $2/M
    assert_eq!(message.usage.cost.total_microdollars(), 22);
}

#[tokio::test]
async fn test_completions_without_credential_sends_no_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse(completions_body()))
        .mount(&server)
        .await;

    let model = sample_model(ApiKind::OpenAiCompletions, &server.uri());
    let events = collect_events(OpenAiCompletionsProvider::default().stream(
        &model,
        &count_to_three(),
        &StreamOptions::default(),
        &EnvDefaults::default(),
    ))
    .await;
    assert_eq!(events.last().unwrap().kind(), "done");

    let received = server.received_requests().await.unwrap();
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_completions_send_no_cache_directives() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse(completions_body()))
        .mount(&server)
        .await;

    let (seen, options) = recorder();
    let options = StreamOptions {
        cache_retention: Some(CacheRetention::Long),
        session_id: Some("session-7".into()),
        ..options
    };
    let model = sample_model(ApiKind::OpenAiCompletions, &server.uri());
    collect_events(OpenAiCompletionsProvider::default().stream(
        &model,
        &count_to_three(),
        &options,
        &EnvDefaults::default(),
    ))
    .await;

    let body = seen.lock().unwrap().clone().unwrap();
    assert!(body.get("prompt_cache_key").is_none());
    assert_eq!(body["stream_options"]["include_usage"], true);
}
