use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Error body returned by the backend on non-2xx responses.
///
/// The fixed fields cover the documented error shape; everything else the
/// backend attaches lands in `extra` and is preserved verbatim on the
/// resulting [`OrbitLinkError::ServerError`](crate::OrbitLinkError).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Machine-readable error code
    #[serde(default)]
    pub error_code: Option<String>,
    /// Human-readable error message
    #[serde(default)]
    pub message: Option<String>,
    /// HTTP status echoed in the body, when present
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Suggested follow-up actions
    #[serde(default)]
    pub next_actions: Option<String>,
    /// All additional backend-specific fields
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_fields_are_preserved() {
        let json = r#"{
            "errorCode": "rate_limited",
            "message": "Too many requests",
            "statusCode": 429,
            "retryAfterSeconds": 30,
            "requestId": "req-abc"
        }"#;
        let body: ApiErrorBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.error_code.as_deref(), Some("rate_limited"));
        assert_eq!(body.status_code, Some(429));
        assert_eq!(body.extra["retryAfterSeconds"], 30);
        assert_eq!(body.extra["requestId"], "req-abc");
    }

    #[test]
    fn test_empty_body_uses_defaults() {
        let body: ApiErrorBody = serde_json::from_str("{}").unwrap();
        assert!(body.error_code.is_none());
        assert!(body.message.is_none());
        assert!(body.extra.is_empty());
    }
}
