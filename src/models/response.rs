//! Normalized response data captured from the transport, and the error
//! descriptor used when a call produced no response.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Coarse classification of why a call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request could not be attempted as configured
    Config,
    Timeout,
    Connect,
    Dns,
    Tls,
    Other,
}

/// Error descriptor for a call with no response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    pub message: String,
    pub kind: ErrorKind,
}

impl RequestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RequestError {
            message: message.into(),
            kind,
        }
    }
}

/// One parsed Set-Cookie entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieInfo {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Unix timestamp of the Expires attribute when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

/// Request timing, measured around the transport call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingInfo {
    /// Milliseconds until response headers arrived
    pub ttfb_ms: u64,
    /// Milliseconds until the body was fully read
    pub total_ms: u64,
}

/// Byte counts for the received response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeInfo {
    pub headers_bytes: u64,
    pub body_bytes: u64,
    pub total_bytes: u64,
}

/// Everything captured from one HTTP exchange that produced a response,
/// including HTTP error statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Header pairs in arrival order; repeated names are kept
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8, lossily for non-text payloads
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<CookieInfo>,
    pub timing: TimingInfo,
    pub size: SizeInfo,
}

impl ResponseInfo {
    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResponseInfo {
        ResponseInfo {
            status: 200,
            reason: Some("OK".to_string()),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("X-Req-Id".to_string(), "abc".to_string()),
            ],
            body: r#"{"ready": true}"#.to_string(),
            cookies: Vec::new(),
            timing: TimingInfo::default(),
            size: SizeInfo::default(),
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = sample();
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.header("X-REQ-ID"), Some("abc"));
        assert_eq!(resp.header("missing"), None);
    }

    #[test]
    fn test_body_json_parses() {
        let resp = sample();
        assert_eq!(resp.json().unwrap()["ready"], true);
    }
}
