//! The normalized result of executing one request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::outcome::TestOutcome;
use crate::models::request::ResolvedRequest;
use crate::models::response::{RequestError, ResponseInfo};

/// Outcome of a single request execution. Exactly one of `response` and
/// `error` is present: a response (any status) or an error descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// True when a response was received, even an HTTP error status
    pub ok: bool,
    /// What was actually sent, after resolution and auth injection
    pub request: ResolvedRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RequestError>,
    /// Present when at least one script phase ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestOutcome>,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn responded(request: ResolvedRequest, response: ResponseInfo) -> Self {
        ExecutionResult {
            ok: true,
            request,
            response: Some(response),
            error: None,
            tests: None,
            executed_at: Utc::now(),
        }
    }

    pub fn errored(request: ResolvedRequest, error: RequestError) -> Self {
        ExecutionResult {
            ok: false,
            request,
            response: None,
            error: Some(error),
            tests: None,
            executed_at: Utc::now(),
        }
    }

    /// Pass/fail rule. Recorded test entries decide when any exist;
    /// without entries the status class decides, and a call with no
    /// response fails.
    pub fn passed(&self) -> bool {
        if let Some(outcome) = &self.tests {
            if outcome.failed > 0 {
                return false;
            }
            if !outcome.tests.is_empty() {
                return true;
            }
        }
        match &self.response {
            Some(response) => response.is_success(),
            None => false,
        }
    }
}
