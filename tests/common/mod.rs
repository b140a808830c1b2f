//! Common fixtures for waypost integration tests: executors wired to
//! in-memory stores, and builders for the scopes the tests share.

use std::sync::Arc;

use waypost::models::{RequestConfig, ScopeId, Variable};
use waypost::request::RequestExecutor;
use waypost::stores::{InMemoryHistory, InMemoryVariableStore};

/// Environment scope id used across tests.
pub fn env_scope() -> ScopeId {
    ScopeId::Environment("env1".to_string())
}

/// Variable store holding the given variables under the `env1` scope.
pub fn env_vars(pairs: &[(&str, &str)]) -> Arc<InMemoryVariableStore> {
    let vars: Vec<Variable> = pairs.iter().map(|(k, v)| Variable::new(*k, *v)).collect();
    Arc::new(InMemoryVariableStore::new().with_scope(env_scope(), vars))
}

/// Executor over the given stores. Honors `RUST_LOG` when set.
pub fn executor(
    vars: Arc<InMemoryVariableStore>,
    history: Arc<InMemoryHistory>,
) -> RequestExecutor {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    RequestExecutor::new(vars, history).expect("executor construction")
}

/// GET request pointed at `url`.
pub fn get(url: impl Into<String>) -> RequestConfig {
    RequestConfig::new("GET", url)
}
