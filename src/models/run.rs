//! Report types for collection runs.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::result::ExecutionResult;

/// One row of iteration data. Keys are variable names, values come from
/// the CSV or JSON source and keep their JSON type.
pub type DataRow = IndexMap<String, JsonValue>;

/// Lifecycle state of a collection run. Results returned by the runner
/// carry a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    /// Aborted by stop-on-error
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Passed,
    Failed,
}

/// Result of one request within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRunResult {
    pub request_id: String,
    pub request_name: String,
    pub status: RequestStatus,
    pub execution: ExecutionResult,
}

impl RequestRunResult {
    pub fn passed(&self) -> bool {
        self.status == RequestStatus::Passed
    }
}

/// Results of one pass over the gathered requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    /// Zero-based iteration index
    pub iteration: u32,
    /// Data row bound to this iteration, when a data source was supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_row: Option<DataRow>,
    pub requests: Vec<RequestRunResult>,
    pub passed: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Full report of a collection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRunResult {
    pub run_id: Uuid,
    pub collection_id: String,
    pub collection_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Planned request count: gathered requests times iterations
    pub total_requests: usize,
    pub passed: usize,
    pub failed: usize,
    pub iterations: Vec<IterationResult>,
}

impl CollectionRunResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.status == RunStatus::Completed
    }
}
