//! Single-request execution: scope loading, script phases, dispatch,
//! and history recording.
//!
//! Transport failures never surface as `Err`. A call that reached the
//! network settles as an `ExecutionResult` carrying either a response or
//! an error descriptor; `Err` is reserved for configuration problems
//! that stop the request from being attempted at all.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{redirect, Client};
use tracing::{debug, warn};
use url::Url;

use super::builder::{build_request, BuiltRequest};
use super::cookies::parse_set_cookie;
use crate::errors::{Result, WaypostError};
use crate::models::{
    DataRow, ErrorKind, ExecutionResult, RequestConfig, RequestError, ResolvedRequest,
    ResponseInfo, ScopeId, ScriptPhase, SizeInfo, TestOutcome, TimingInfo, TransportOptions,
};
use crate::resolver::{resolve_config, ScopeSet};
use crate::scripting::{RequestView, ResponseView, SandboxLimits, ScriptInput, ScriptSandbox};
use crate::stores::{HistorySink, VariableStore};

/// Context for one execution: which scopes are active and, during
/// collection runs, the iteration position.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Active environment scope, if any
    pub environment_id: Option<String>,
    /// Collection whose variables and scripts apply
    pub collection_id: Option<String>,
    /// Data-driven variables for this iteration
    pub data_row: Option<DataRow>,
    /// Zero-based iteration index, surfaced to scripts
    pub iteration: u32,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(mut self, id: impl Into<String>) -> Self {
        self.environment_id = Some(id.into());
        self
    }

    pub fn collection(mut self, id: impl Into<String>) -> Self {
        self.collection_id = Some(id.into());
        self
    }
}

/// Executes requests against the collaborator stores.
pub struct RequestExecutor {
    vars: Arc<dyn VariableStore>,
    history: Arc<dyn HistorySink>,
    sandbox: ScriptSandbox,
    client: Client,
}

impl RequestExecutor {
    pub fn new(vars: Arc<dyn VariableStore>, history: Arc<dyn HistorySink>) -> Result<Self> {
        Self::with_limits(vars, history, SandboxLimits::default())
    }

    pub fn with_limits(
        vars: Arc<dyn VariableStore>,
        history: Arc<dyn HistorySink>,
        limits: SandboxLimits,
    ) -> Result<Self> {
        let defaults = TransportOptions::default();
        let client = Client::builder()
            .redirect(redirect::Policy::limited(defaults.max_redirects as usize))
            .build()?;
        Ok(RequestExecutor {
            vars,
            history,
            sandbox: ScriptSandbox::with_limits(limits),
            client,
        })
    }

    /// Runs one request end to end: load scopes, pre-request script,
    /// resolve, dispatch, test script, record. The returned result has
    /// already been offered to the history sink.
    pub async fn execute(
        &self,
        config: &RequestConfig,
        options: &ExecuteOptions,
    ) -> Result<ExecutionResult> {
        if config.url.trim().is_empty() {
            return Err(WaypostError::Config("request URL is empty".to_string()));
        }
        if config.method.trim().is_empty() {
            return Err(WaypostError::Config("request method is empty".to_string()));
        }

        let mut scopes = self.load_scopes(options).await?;

        let mut pre_outcome = None;
        if let Some(source) = script_source(&config.pre_request_script) {
            let mut input = ScriptInput::for_phase(ScriptPhase::PreRequest, &scopes);
            input.iteration = options.iteration;
            input.request = Some(RequestView::preview(&resolve_config(config, &scopes)));
            let outcome = self.run_phase(source, &input);
            self.persist_updates(options, &outcome, &mut scopes).await;
            pre_outcome = Some(outcome);
        }

        // Resolve after the pre-request phase so its updates apply.
        let resolved = resolve_config(config, &scopes);
        debug!("executing {} {}", resolved.method, resolved.url);

        let client = self.client_for(&resolved.options)?;
        let mut result = self.attempt(&client, &resolved).await?;

        let mut post_outcome = None;
        if let Some(source) = script_source(&config.test_script) {
            let mut input = ScriptInput::for_phase(ScriptPhase::Test, &scopes);
            input.iteration = options.iteration;
            input.request = Some(RequestView::from_resolved(&result.request));
            input.response = result.response.as_ref().map(ResponseView::from_response);
            input.error = result.error.clone();
            let outcome = self.run_phase(source, &input);
            self.persist_updates(options, &outcome, &mut scopes).await;
            post_outcome = Some(outcome);
        }

        result.tests = match (pre_outcome, post_outcome) {
            (None, None) => None,
            (Some(pre), None) => Some(pre),
            (None, Some(post)) => Some(post),
            (Some(pre), Some(post)) => Some(pre.merge(post)),
        };

        if let Err(e) = self.history.record(&result).await {
            warn!("history sink error: {}", e);
        }

        Ok(result)
    }

    /// Runs a script outside any request, such as a collection-level
    /// pre-request script. Variable updates are persisted the same way
    /// request-attached phases persist theirs.
    pub async fn run_standalone_script(
        &self,
        source: &str,
        options: &ExecuteOptions,
    ) -> Result<TestOutcome> {
        let mut scopes = self.load_scopes(options).await?;
        let mut input = ScriptInput::for_phase(ScriptPhase::PreRequest, &scopes);
        input.iteration = options.iteration;
        let outcome = self.run_phase(source, &input);
        self.persist_updates(options, &outcome, &mut scopes).await;
        Ok(outcome)
    }

    /// Loads the variable scopes an execution sees. Globals come from
    /// the workspace the active environment or collection belongs to;
    /// an environment and collection from different workspaces is a
    /// configuration error.
    async fn load_scopes(&self, options: &ExecuteOptions) -> Result<ScopeSet> {
        let mut scopes = ScopeSet::default();
        let mut workspace: Option<String> = None;

        if let Some(env_id) = &options.environment_id {
            let scope = ScopeId::Environment(env_id.clone());
            scopes.environment = self.vars.scope_variables(&scope).await?;
            workspace = self.vars.workspace_of(&scope).await?;
        }
        if let Some(collection_id) = &options.collection_id {
            let scope = ScopeId::Collection(collection_id.clone());
            scopes.collection = self.vars.scope_variables(&scope).await?;
            if let Some(collection_ws) = self.vars.workspace_of(&scope).await? {
                match &workspace {
                    Some(env_ws) if env_ws != &collection_ws => {
                        return Err(WaypostError::Config(format!(
                            "environment belongs to workspace {} but collection belongs to {}",
                            env_ws, collection_ws
                        )));
                    }
                    _ => workspace = Some(collection_ws),
                }
            }
        }
        if let Some(ws) = workspace {
            scopes.globals = self.vars.scope_variables(&ScopeId::Workspace(ws)).await?;
        }
        scopes.data_row = options.data_row.clone();
        Ok(scopes)
    }

    fn run_phase(&self, source: &str, input: &ScriptInput) -> TestOutcome {
        match self.sandbox.run(source, input) {
            Ok(outcome) => outcome,
            Err(e) => {
                let mut outcome = TestOutcome::default();
                outcome.push_failure(input.phase.label(), e.to_string());
                outcome
            }
        }
    }

    /// Persists a phase's variable updates and mirrors them into the
    /// loaded scopes so later phases and the re-resolution see them.
    /// Updates with no active target scope are dropped.
    async fn persist_updates(
        &self,
        options: &ExecuteOptions,
        outcome: &TestOutcome,
        scopes: &mut ScopeSet,
    ) {
        if !outcome.environment_updates.is_empty() {
            match &options.environment_id {
                Some(env_id) => {
                    let scope = ScopeId::Environment(env_id.clone());
                    if let Err(e) = self
                        .vars
                        .apply_updates(&scope, &outcome.environment_updates)
                        .await
                    {
                        warn!("failed to persist environment updates: {}", e);
                    }
                    scopes.apply_environment_updates(&outcome.environment_updates);
                }
                None => {
                    warn!("script updated environment variables but no environment is active");
                }
            }
        }
        if !outcome.collection_updates.is_empty() {
            match &options.collection_id {
                Some(collection_id) => {
                    let scope = ScopeId::Collection(collection_id.clone());
                    if let Err(e) = self
                        .vars
                        .apply_updates(&scope, &outcome.collection_updates)
                        .await
                    {
                        warn!("failed to persist collection updates: {}", e);
                    }
                    scopes.apply_collection_updates(&outcome.collection_updates);
                }
                None => {
                    warn!("script updated collection variables but no collection is active");
                }
            }
        }
    }

    /// Reuses the shared client unless the request carries non-default
    /// transport options.
    fn client_for(&self, options: &TransportOptions) -> Result<Client> {
        let defaults = TransportOptions::default();
        let needs_custom = options.follow_redirects != defaults.follow_redirects
            || options.max_redirects != defaults.max_redirects
            || options.verify_tls != defaults.verify_tls;
        if !needs_custom {
            return Ok(self.client.clone());
        }

        let policy = if options.follow_redirects {
            redirect::Policy::limited(options.max_redirects as usize)
        } else {
            redirect::Policy::none()
        };
        let mut builder = Client::builder().redirect(policy);
        if !options.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(builder.build()?)
    }

    /// Builds and dispatches the resolved request. Everything past this
    /// point settles as a result; only build problems return `Err`.
    async fn attempt(&self, client: &Client, resolved: &RequestConfig) -> Result<ExecutionResult> {
        let timeout = Duration::from_millis(resolved.options.timeout_ms);

        // A URL that still carries unresolved tokens is recorded as a
        // failed attempt, not a config error: the request text may be
        // fine under another environment.
        if Url::parse(resolved.url.trim()).is_err() && resolved.url.contains("{{") {
            let snapshot = ResolvedRequest {
                method: resolved.method.to_uppercase(),
                url: resolved.url.clone(),
                headers: Vec::new(),
                body: None,
            };
            return Ok(ExecutionResult::errored(
                snapshot,
                RequestError::new(
                    ErrorKind::Other,
                    format!("URL contains unresolved variables: {}", resolved.url),
                ),
            ));
        }

        let BuiltRequest { builder, snapshot } = build_request(client, resolved)?;

        let started = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(ExecutionResult::errored(
                    snapshot,
                    classify_transport_error(&e, timeout),
                ));
            }
        };
        let ttfb_ms = started.elapsed().as_millis() as u64;

        let status = response.status();
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut cookies = Vec::new();
        let mut headers_bytes: u64 = 0;
        for (name, value) in response.headers() {
            let value_text = String::from_utf8_lossy(value.as_bytes()).into_owned();
            // name: value\r\n
            headers_bytes += (name.as_str().len() + value_text.len() + 4) as u64;
            if name == reqwest::header::SET_COOKIE {
                cookies.extend(parse_set_cookie(&value_text));
            }
            headers.push((name.as_str().to_string(), value_text));
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok(ExecutionResult::errored(
                    snapshot,
                    classify_transport_error(&e, timeout),
                ));
            }
        };
        let total_ms = started.elapsed().as_millis() as u64;

        let body_bytes = bytes.len() as u64;
        let info = ResponseInfo {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            cookies,
            timing: TimingInfo { ttfb_ms, total_ms },
            size: SizeInfo {
                headers_bytes,
                body_bytes,
                total_bytes: headers_bytes + body_bytes,
            },
        };
        Ok(ExecutionResult::responded(snapshot, info))
    }
}

fn script_source(slot: &Option<String>) -> Option<&str> {
    slot.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn classify_transport_error(error: &reqwest::Error, timeout: Duration) -> RequestError {
    if error.is_timeout() {
        return RequestError::new(
            ErrorKind::Timeout,
            format!("Request timed out after {:?}", timeout),
        );
    }
    if error.is_connect() {
        let chain = error_chain_text(error);
        let kind = if chain.contains("dns") || chain.contains("resolve") {
            ErrorKind::Dns
        } else if chain.contains("certificate") || chain.contains("tls") || chain.contains("ssl") {
            ErrorKind::Tls
        } else {
            ErrorKind::Connect
        };
        return RequestError::new(kind, format!("Connection failed: {}", error));
    }
    if error.is_request() {
        return RequestError::new(ErrorKind::Other, format!("Request error: {}", error));
    }
    RequestError::new(ErrorKind::Other, error.to_string())
}

fn error_chain_text(error: &reqwest::Error) -> String {
    let mut text = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text.to_lowercase()
}
