//! Sequential collection runs: every gathered request, once per
//! iteration, with cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use super::data::DataTable;
use super::gather::gather_requests;
use crate::errors::{Result, WaypostError};
use crate::models::{
    CollectionRunResult, ErrorKind, ExecutionResult, IterationResult, RequestConfig, RequestError,
    RequestRunResult, RequestStatus, ResolvedRequest, RunStatus,
};
use crate::request::{ExecuteOptions, RequestExecutor};
use crate::stores::CollectionStore;

/// What a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    /// Every request in the collection
    Collection(String),
    /// One folder subtree inside its collection
    Folder(String),
}

impl RunTarget {
    fn container_id(&self) -> &str {
        match self {
            RunTarget::Collection(id) | RunTarget::Folder(id) => id,
        }
    }
}

/// Run configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub environment_id: Option<String>,
    /// Number of passes over the requests when no data source is set
    pub iterations: u32,
    /// Pause between consecutive requests within an iteration
    pub delay_ms: u64,
    /// Abort the run at the first failing request
    pub stop_on_error: bool,
    /// Data source; when present its row count drives the iterations
    pub data: Option<DataTable>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            environment_id: None,
            iterations: 1,
            delay_ms: 0,
            stop_on_error: false,
            data: None,
        }
    }
}

/// Cancellation flag shared with a running collection run. The run
/// polls it at iteration and request boundaries; the request in flight
/// is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct RunHandle {
    cancelled: Arc<AtomicBool>,
}

impl RunHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Runs collections and folders against an executor.
pub struct CollectionRunner {
    collections: Arc<dyn CollectionStore>,
    executor: RequestExecutor,
}

impl CollectionRunner {
    pub fn new(executor: RequestExecutor, collections: Arc<dyn CollectionStore>) -> Self {
        CollectionRunner {
            collections,
            executor,
        }
    }

    /// Executes the target sequentially and returns the full report.
    /// Requests that fail to execute for configuration reasons become
    /// failed entries in the report instead of aborting the run.
    pub async fn run(
        &self,
        target: &RunTarget,
        options: &RunOptions,
        handle: &RunHandle,
    ) -> Result<CollectionRunResult> {
        let container_id = target.container_id();
        let collection = self.collections.root_collection_for(container_id).await?;
        let gathered =
            gather_requests(self.collections.as_ref(), &collection.id, container_id).await?;
        if gathered.is_empty() {
            return Err(WaypostError::Config(format!(
                "nothing to run under {}",
                container_id
            )));
        }

        let iteration_count = match &options.data {
            Some(table) => {
                if table.is_empty() {
                    return Err(WaypostError::Data("data source has no rows".to_string()));
                }
                table.len() as u32
            }
            None => options.iterations,
        };
        if iteration_count == 0 {
            return Err(WaypostError::Config(
                "iterations must be at least 1".to_string(),
            ));
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        debug!(
            "run {} starting: {} requests x {} iterations",
            run_id,
            gathered.len(),
            iteration_count
        );

        let mut iterations: Vec<IterationResult> = Vec::new();
        let mut cancelled = false;
        let mut stopped = false;

        for index in 0..iteration_count {
            if handle.is_cancelled() {
                cancelled = true;
                break;
            }

            let data_row = options
                .data
                .as_ref()
                .and_then(|table| table.row(index as usize))
                .cloned();
            let exec_options = ExecuteOptions {
                environment_id: options.environment_id.clone(),
                collection_id: Some(collection.id.clone()),
                data_row: data_row.clone(),
                iteration: index,
            };

            self.run_collection_script(&collection.pre_request_script, &exec_options)
                .await;

            let iteration_started = Instant::now();
            let mut requests: Vec<RequestRunResult> = Vec::new();
            let mut passed = 0usize;
            let mut failed = 0usize;

            for (position, request) in gathered.iter().enumerate() {
                if handle.is_cancelled() {
                    cancelled = true;
                    break;
                }
                // The delay spaces requests inside one iteration; the
                // iteration boundary itself is not delayed.
                if options.delay_ms > 0 && position > 0 {
                    sleep(Duration::from_millis(options.delay_ms)).await;
                    if handle.is_cancelled() {
                        cancelled = true;
                        break;
                    }
                }

                let execution = match self.executor.execute(&request.config, &exec_options).await
                {
                    Ok(result) => result,
                    Err(e) => config_failure(&request.config, &e),
                };

                let ok = execution.passed();
                if ok {
                    passed += 1;
                } else {
                    failed += 1;
                }
                requests.push(RequestRunResult {
                    request_id: request.id.clone(),
                    request_name: request.name.clone(),
                    status: if ok {
                        RequestStatus::Passed
                    } else {
                        RequestStatus::Failed
                    },
                    execution,
                });

                if !ok && options.stop_on_error {
                    stopped = true;
                    break;
                }
            }

            // A cancellation that lands mid-iteration still reports the
            // requests that did run.
            if !requests.is_empty() {
                iterations.push(IterationResult {
                    iteration: index,
                    data_row,
                    requests,
                    passed,
                    failed,
                    elapsed_ms: iteration_started.elapsed().as_millis() as u64,
                });
            }
            if cancelled || stopped {
                break;
            }
        }

        let status = if cancelled {
            RunStatus::Cancelled
        } else if stopped {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        let passed = iterations.iter().map(|i| i.passed).sum();
        let failed = iterations.iter().map(|i| i.failed).sum();
        debug!("run {} finished: {:?}", run_id, status);

        Ok(CollectionRunResult {
            run_id,
            collection_id: collection.id,
            collection_name: collection.name,
            status,
            started_at,
            finished_at: Utc::now(),
            total_requests: gathered.len() * iteration_count as usize,
            passed,
            failed,
            iterations,
        })
    }

    /// Collection-level pre-request script. Its console output and
    /// failures are logged, not counted against any request.
    async fn run_collection_script(&self, script: &Option<String>, options: &ExecuteOptions) {
        let source = match script.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(source) => source,
            None => return,
        };
        match self.executor.run_standalone_script(source, options).await {
            Ok(outcome) => {
                for line in &outcome.console {
                    debug!("collection script console: {}", line.message);
                }
                if !outcome.all_passed() {
                    let detail = outcome
                        .tests
                        .iter()
                        .find(|t| !t.passed)
                        .and_then(|t| t.error.clone())
                        .unwrap_or_else(|| "script failed".to_string());
                    warn!("collection pre-request script failed: {}", detail);
                }
            }
            Err(e) => warn!("collection pre-request script error: {}", e),
        }
    }
}

fn config_failure(config: &RequestConfig, error: &WaypostError) -> ExecutionResult {
    let snapshot = ResolvedRequest {
        method: config.method.trim().to_uppercase(),
        url: config.url.clone(),
        headers: Vec::new(),
        body: None,
    };
    ExecutionResult::errored(
        snapshot,
        RequestError::new(ErrorKind::Config, error.to_string()),
    )
}
