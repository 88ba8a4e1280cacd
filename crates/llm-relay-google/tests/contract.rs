//! Contract tests for the Google adapter against a mock server.

use std::sync::{Arc, Mutex};

use llm_relay_core::test_helpers::{
    assert_lawful, collect_events, count_to_three, final_message, sample_model, sse_data,
    text_deltas,
};
use llm_relay_core::{
    ApiKind, AssistantMessage, ContentBlock, Context, EnvDefaults, Message, StopReason,
    StreamOptions, ToolCall,
};
use llm_relay_google::GoogleProvider;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn counting_body() -> String {
    sse_data(&[
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "1, "}]}}], "responseId": "r-1"}),
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "2, "}]}}]}),
        json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "3"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 6, "totalTokenCount": 16}
        }),
    ])
}

fn sse(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn with_key() -> StreamOptions {
    StreamOptions {
        api_key: Some("AIza-test".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_count_to_three() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/test-model:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "AIza-test"))
        .respond_with(sse(counting_body()))
        .expect(1)
        .mount(&server)
        .await;

    let model = sample_model(ApiKind::GoogleGenerativeAi, &format!("{}/v1beta", server.uri()));
    let events = collect_events(GoogleProvider::default().stream(
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
    assert_eq!(message.response_id.as_deref(), Some("r-1"));
    assert_eq!(message.usage.total_tokens, 16);
    assert_eq!(message.usage.cost.total_microdollars(), 22);
}

#[tokio::test]
async fn test_vertex_uses_bearer_token_from_env() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer ya29.token"))
        .respond_with(sse(counting_body()))
        .expect(1)
        .mount(&server)
        .await;

    let env = EnvDefaults {
        google_access_token: Some("ya29.token".into()),
        ..Default::default()
    };
    let model = sample_model(ApiKind::GoogleVertex, &server.uri());
    let events = collect_events(GoogleProvider::default().stream(
        &model,
        &count_to_three(),
        &StreamOptions::default(),
        &env,
    ))
    .await;
    assert_eq!(events.last().unwrap().kind(), "done");

    let received = server.received_requests().await.unwrap();
    assert!(received[0].headers.get("x-goog-api-key").is_none());
}

#[tokio::test]
async fn test_history_filtering_reaches_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse(counting_body()))
        .mount(&server)
        .await;

    let model = sample_model(ApiKind::GoogleGenerativeAi, &server.uri());
    let turn = |signature: Option<&str>, id: &str| {
        let mut msg = AssistantMessage::empty(model.api, model.provider.clone(), model.id.clone());
        msg.content = vec![ContentBlock::ToolCall(ToolCall {
            id: id.into(),
            name: "lookup".into(),
            arguments: json!({}),
            thought_signature: signature.map(str::to_owned),
        })];
        Message::from(msg)
    };
    let context = Context {
        system_prompt: None,
        messages: vec![
            Message::user("first"),
            turn(None, "unsigned"),
            Message::tool_result("unsigned", "lookup", "dropped"),
            Message::user("second"),
            turn(Some("c2lnbmF0dXJl"), "signed"),
            Message::tool_result("signed", "lookup", "kept"),
        ],
        tools: Vec::new(),
    };

    let seen: Arc<Mutex<Option<Value>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let options = StreamOptions {
        on_payload: Some(Arc::new(move |body: &Value| {
            *sink.lock().unwrap() = Some(body.clone());
        })),
        ..with_key()
    };
    let events = collect_events(GoogleProvider::default().stream(
        &model,
        &context,
        &options,
        &EnvDefaults::default(),
    ))
    .await;
    assert_eq!(events.last().unwrap().kind(), "done");

    let body = seen.lock().unwrap().clone().unwrap();
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 4);
    assert!(!body.to_string().contains("dropped"));
    assert_eq!(contents[2]["parts"][0]["thoughtSignature"], "c2lnbmF0dXJl");
    assert_eq!(contents[3]["parts"][0]["functionResponse"]["response"]["output"], "kept");
}

#[tokio::test]
async fn test_quota_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let model = sample_model(ApiKind::GoogleGenerativeAi, &server.uri());
    let events = collect_events(GoogleProvider::default().stream(
        &model,
        &count_to_three(),
        &with_key(),
        &EnvDefaults::default(),
    ))
    .await;
    assert_lawful(&events);
    let message = final_message(&events);
    assert_eq!(message.stop_reason, StopReason::Error);
    assert!(message.error_message.as_deref().unwrap().contains("Quota exceeded"));
}
