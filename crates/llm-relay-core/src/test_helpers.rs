//! Pre-built helpers for testing adapters and callers.
//!
//! Available when the `test-utils` feature is enabled, so the adapter
//! crates and the facade reuse them in their own test suites. Also
//! compiled during `#[cfg(test)]` for this crate's own tests.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;

use crate::chat::{AssistantMessage, Context};
use crate::model::{ApiKind, InputKind, Model, ModelCost};
use crate::stream::{AssistantMessageEvent, AssistantMessageEventStream};

/// A model speaking `api` at `base_url`, with image input and a non-zero
/// price table.
pub fn sample_model(api: ApiKind, base_url: &str) -> Model {
    let provider = match api {
        ApiKind::AnthropicMessages => "anthropic",
        ApiKind::OpenAiResponses => "openai",
        ApiKind::OpenAiCompletions => "local",
        ApiKind::GoogleGenerativeAi | ApiKind::GoogleVertex => "google",
    };
    Model {
        input: vec![InputKind::Text, InputKind::Image],
        cost: ModelCost {
            input: 1.0,
            output: 2.0,
            cache_read: 0.5,
            cache_write: 1.5,
        },
        ..Model::new("test-model", api, provider, base_url)
    }
}

/// The canonical smoke-test context: one user message, "Count to 3".
pub fn count_to_three() -> Context {
    Context::from_prompt("Count to 3")
}

/// Drains a stream into a vector.
pub async fn collect_events(stream: AssistantMessageEventStream) -> Vec<AssistantMessageEvent> {
    stream.collect().await
}

/// The message carried by the terminal event.
///
/// # Panics
///
/// Panics if the last event is not terminal.
pub fn final_message(events: &[AssistantMessageEvent]) -> Arc<AssistantMessage> {
    let last = events.last().expect("stream produced no events");
    assert!(last.is_terminal(), "last event is {}, not terminal", last.kind());
    Arc::clone(last.partial())
}

/// Concatenation of every `text_delta` in order.
pub fn text_deltas(events: &[AssistantMessageEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            AssistantMessageEvent::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}

/// Number of events of the given kind (see [`AssistantMessageEvent::kind`]).
pub fn count_kind(events: &[AssistantMessageEvent], kind: &str) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Started,
    Ended,
}

/// Asserts the event-ordering contract:
///
/// - exactly one `start`, and it comes first;
/// - exactly one terminal event, and it comes last;
/// - per content index: one `*_start`, then `*_delta`s, then at most one
///   `*_end`, never mixing block families;
/// - indices first appear in increasing order and are never reused.
///
/// # Panics
///
/// Panics with a description of the first violation.
pub fn assert_lawful(events: &[AssistantMessageEvent]) {
    assert!(!events.is_empty(), "no events");
    assert_eq!(events[0].kind(), "start", "first event must be start");
    assert_eq!(count_kind(events, "start"), 1, "exactly one start");
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "exactly one done/error");
    assert!(events[events.len() - 1].is_terminal(), "terminal event must be last");

    let mut phases: HashMap<usize, (Phase, &'static str)> = HashMap::new();
    let mut highest: Option<usize> = None;
    for event in events {
        let Some(index) = event.content_index() else {
            continue;
        };
        let kind = event.kind();
        let (family, step) = kind.rsplit_once('_').expect("block events are family_step");
        match step {
            "start" => {
                assert!(!phases.contains_key(&index), "index {index} started twice");
                if let Some(h) = highest {
                    assert!(index > h, "index {index} assigned after {h}");
                }
                highest = Some(index);
                let family: &'static str = match family {
                    "text" => "text",
                    "thinking" => "thinking",
                    _ => "toolcall",
                };
                phases.insert(index, (Phase::Started, family));
            }
            "delta" | "end" => {
                let Some((phase, started_family)) = phases.get_mut(&index) else {
                    panic!("{kind} for index {index} before its start");
                };
                assert_eq!(*started_family, family, "{kind} on a {started_family} block");
                assert_eq!(*phase, Phase::Started, "{kind} for index {index} after its end");
                if step == "end" {
                    *phase = Phase::Ended;
                }
            }
            other => panic!("unexpected step {other}"),
        }
    }
}

/// An SSE body of named events, as Anthropic and OpenAI Responses send.
pub fn sse_named(events: &[(&str, Value)]) -> String {
    events
        .iter()
        .map(|(name, data)| format!("event: {name}\ndata: {data}\n\n"))
        .collect()
}

/// An SSE body of unnamed `data:` events, as chat completions and Gemini
/// send.
pub fn sse_data(events: &[Value]) -> String {
    events.iter().map(|data| format!("data: {data}\n\n")).collect()
}
