//! `OpenAI` error bodies, shared by both adapters.

use http::StatusCode;
use llm_relay_core::LlmError;
use llm_relay_core::driver::status_error;
use serde::Deserialize;

/// Error response body from the API.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail, also the shape of in-stream `error` events and
/// `response.error`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: Option<String>,
}

impl ErrorDetail {
    pub fn into_error(self) -> LlmError {
        LlmError::Vendor {
            status: None,
            code: self.code.or(self.error_type),
            message: self.message,
        }
    }
}

/// Some compatible servers send numeric codes.
fn code_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

/// Convert an HTTP status + optional error body into an [`LlmError`].
pub(crate) fn convert_error(status: StatusCode, body: &str) -> LlmError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(resp) => {
            let code = resp.error.code.or(resp.error.error_type);
            match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth(resp.error.message),
                StatusCode::BAD_REQUEST => LlmError::InvalidRequest(resp.error.message),
                _ => status_error(status, code, resp.error.message),
            }
        }
        Err(_) => {
            let message = if body.trim().is_empty() {
                status.to_string()
            } else {
                body.to_owned()
            };
            status_error(status, None, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_auth() {
        let err = convert_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error": {"message": "Incorrect API key", "type": "invalid_request_error", "code": "invalid_api_key"}}"#,
        );
        assert_eq!(err, LlmError::Auth("Incorrect API key".into()));
    }

    #[test]
    fn test_convert_error_rate_limit() {
        let err = convert_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"message": "Slow down", "type": "requests", "code": "rate_limit_exceeded"}}"#,
        );
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            LlmError::Vendor { code: Some(ref c), .. } if c == "rate_limit_exceeded"
        ));
    }

    #[test]
    fn test_convert_error_numeric_code_and_plain_body() {
        let err = convert_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error": {"message": "oops", "code": 500}}"#,
        );
        assert!(matches!(err, LlmError::Vendor { code: Some(ref c), .. } if c == "500"));

        let err = convert_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(err, LlmError::Vendor { ref message, .. } if message.contains("503")));
    }
}
