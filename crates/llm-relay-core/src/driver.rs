//! The streaming driver shared by every adapter.
//!
//! An adapter contributes two things: a future that produces the ready
//! HTTP request (payload built, credential resolved), and a
//! [`StreamTranslator`] that maps decoded SSE events onto a
//! [`MessageBuilder`]. [`drive`] owns everything else: the `start`
//! event, sending, status checking, chunk reading under the cancellation
//! token, SSE decoding, and folding every failure into one terminal
//! `error` event.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::LlmError;
use crate::model::Model;
use crate::partial::MessageBuilder;
use crate::sse::{SseDecoder, SseEvent};
use crate::stream::{AssistantMessageEvent, AssistantMessageEventStream};

/// Maps one vendor's SSE events onto the canonical message.
pub trait StreamTranslator: Send + 'static {
    /// Handles one decoded event. Returning `Err` fails the call.
    fn on_event(&mut self, event: &SseEvent, builder: &mut MessageBuilder) -> Result<(), LlmError>;

    /// Called when the body ends and the builder has not finished yet.
    /// The default finishes normally.
    fn on_end(&mut self, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        builder.finish();
        Ok(())
    }

    /// Parses a non-success response body into an error.
    fn vendor_error(status: StatusCode, body: &str) -> LlmError
    where
        Self: Sized;
}

/// Classifies a non-success status when the body says nothing useful.
pub fn status_error(status: StatusCode, code: Option<String>, message: String) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY if code.is_none() => {
            LlmError::InvalidRequest(message)
        }
        _ => LlmError::Vendor {
            status: Some(status),
            code,
            message,
        },
    }
}

async fn send<T, F>(prepare: F, timeout: Option<Duration>) -> Result<reqwest::Response, LlmError>
where
    T: StreamTranslator,
    F: Future<Output = Result<reqwest::RequestBuilder, LlmError>>,
{
    let mut request = prepare.await?;
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    let response = request
        .send()
        .await
        .map_err(|e| LlmError::from_transport(&e, timeout))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(T::vendor_error(status, &body))
}

fn feed<T: StreamTranslator>(
    translator: &mut T,
    builder: &mut MessageBuilder,
    events: Vec<SseEvent>,
) {
    for event in events {
        if builder.is_finished() {
            break;
        }
        if let Err(e) = translator.on_event(&event, builder) {
            builder.fail(&e);
        }
    }
}

/// Runs one streaming call.
///
/// The returned stream yields `start` before any I/O happens, then the
/// translated events, then exactly one `done` or `error`.
pub fn drive<T, F>(
    model: &Model,
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
    prepare: F,
    mut translator: T,
) -> AssistantMessageEventStream
where
    T: StreamTranslator,
    F: Future<Output = Result<reqwest::RequestBuilder, LlmError>> + Send + 'static,
{
    let mut builder = MessageBuilder::new(model);
    let cancel = cancel.unwrap_or_default();
    let model_id = model.id.clone();

    Box::pin(async_stream::stream! {
        builder.start();
        for event in builder.drain() {
            yield event;
        }

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(LlmError::Aborted),
            result = send::<T, F>(prepare, timeout) => result,
        };
        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                debug!(model = %model_id, error = %e, "request failed");
                builder.fail(&e);
                for event in builder.drain() {
                    yield event;
                }
                return;
            }
        };

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => Some(Err(LlmError::Aborted)),
                chunk = body.next() => chunk.map(|c| c.map_err(|e| LlmError::from_transport(&e, timeout))),
            };
            match chunk {
                Some(Ok(bytes)) => match decoder.push(&bytes) {
                    Ok(events) => feed(&mut translator, &mut builder, events),
                    Err(e) => builder.fail(&e),
                },
                Some(Err(e)) => builder.fail(&e),
                None => {
                    if let Some(event) = decoder.finish() {
                        feed(&mut translator, &mut builder, vec![event]);
                    }
                    if !builder.is_finished() {
                        if let Err(e) = translator.on_end(&mut builder) {
                            builder.fail(&e);
                        }
                    }
                    // The body is exhausted; nothing more can arrive.
                    builder.finish();
                }
            }

            let finished = builder.is_finished();
            for event in builder.drain() {
                if let AssistantMessageEvent::Error { reason, error } = &event {
                    debug!(model = %model_id, ?reason, error = ?error.error_message, "stream ended with error");
                } else if let AssistantMessageEvent::Done { reason, .. } = &event {
                    debug!(model = %model_id, ?reason, "stream done");
                }
                yield event;
            }
            if finished {
                break;
            }
        }
    })
}
