//! Collaborator seams: variable storage, collection trees, and history.
//!
//! The engine never touches disk or a database itself. Applications
//! implement these traits over their own persistence; the in-memory
//! implementations here back tests and lightweight embedding.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, WaypostError};
use crate::models::{
    apply_updates, ExecutionResult, RequestConfig, ScopeId, Variable, VariableUpdates,
};

/// A collection as the runner sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRef {
    pub id: String,
    pub name: String,
    /// Workspace owning this collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// Script run once per iteration, before the first request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_request_script: Option<String>,
}

impl CollectionRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        CollectionRef {
            id: id.into(),
            name: name.into(),
            workspace_id: None,
            pre_request_script: None,
        }
    }
}

/// A folder inside a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderRef {
    pub id: String,
    pub name: String,
    /// Parent folder; None means directly under the collection root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Sibling ordering key
    #[serde(default)]
    pub sort_key: f64,
}

impl FolderRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        FolderRef {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            sort_key: 0.0,
        }
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn sorted(mut self, key: f64) -> Self {
        self.sort_key = key;
        self
    }
}

/// A stored request with its position among siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sort_key: f64,
    pub config: RequestConfig,
}

impl CollectionRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, config: RequestConfig) -> Self {
        CollectionRequest {
            id: id.into(),
            name: name.into(),
            sort_key: 0.0,
            config,
        }
    }

    pub fn sorted(mut self, key: f64) -> Self {
        self.sort_key = key;
        self
    }
}

/// Loads and updates scoped variables.
#[async_trait]
pub trait VariableStore: Send + Sync {
    /// Variables of one scope, in stored order. Unknown scopes are empty.
    async fn scope_variables(&self, scope: &ScopeId) -> Result<Vec<Variable>>;

    /// Applies a script's update map to a scope.
    async fn apply_updates(&self, scope: &ScopeId, updates: &VariableUpdates) -> Result<()>;

    /// Workspace an environment or collection scope belongs to, when the
    /// backing data links it to one.
    async fn workspace_of(&self, scope: &ScopeId) -> Result<Option<String>>;
}

/// Read access to the collection tree.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Requests directly inside a collection or folder, in declared order.
    async fn requests_in(&self, container_id: &str) -> Result<Vec<CollectionRequest>>;

    /// Folders directly inside a collection or folder, in declared order.
    async fn child_folders(&self, container_id: &str) -> Result<Vec<FolderRef>>;

    /// Every folder of a collection in one flat listing, so a run can
    /// build the whole tree from a single query.
    async fn folders(&self, collection_id: &str) -> Result<Vec<FolderRef>>;

    /// The collection owning `id`, where `id` may name a folder or the
    /// collection itself.
    async fn root_collection_for(&self, id: &str) -> Result<CollectionRef>;
}

/// Receives finished executions.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, result: &ExecutionResult) -> Result<()>;
}

fn poisoned<T>(_: T) -> WaypostError {
    WaypostError::Store("store lock poisoned".to_string())
}

/// In-memory variable store. Reads after `apply_updates` observe the
/// write, which is the ordering the engine depends on between requests.
#[derive(Default)]
pub struct InMemoryVariableStore {
    scopes: RwLock<HashMap<ScopeId, Vec<Variable>>>,
    workspaces: RwLock<HashMap<ScopeId, String>>,
}

impl InMemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(self, scope: ScopeId, vars: Vec<Variable>) -> Self {
        if let Ok(mut scopes) = self.scopes.write() {
            scopes.insert(scope, vars);
        }
        self
    }

    pub fn link_workspace(self, scope: ScopeId, workspace: impl Into<String>) -> Self {
        if let Ok(mut workspaces) = self.workspaces.write() {
            workspaces.insert(scope, workspace.into());
        }
        self
    }

    /// Replaces a scope's variables outside the builder flow.
    pub fn set_scope(&self, scope: ScopeId, vars: Vec<Variable>) {
        if let Ok(mut scopes) = self.scopes.write() {
            scopes.insert(scope, vars);
        }
    }
}

#[async_trait]
impl VariableStore for InMemoryVariableStore {
    async fn scope_variables(&self, scope: &ScopeId) -> Result<Vec<Variable>> {
        let scopes = self.scopes.read().map_err(poisoned)?;
        Ok(scopes.get(scope).cloned().unwrap_or_default())
    }

    async fn apply_updates(&self, scope: &ScopeId, updates: &VariableUpdates) -> Result<()> {
        let mut scopes = self.scopes.write().map_err(poisoned)?;
        let vars = scopes.entry(scope.clone()).or_default();
        apply_updates(vars, updates);
        Ok(())
    }

    async fn workspace_of(&self, scope: &ScopeId) -> Result<Option<String>> {
        if let ScopeId::Workspace(id) = scope {
            return Ok(Some(id.clone()));
        }
        let workspaces = self.workspaces.read().map_err(poisoned)?;
        Ok(workspaces.get(scope).cloned())
    }
}

#[derive(Default)]
struct CollectionTree {
    collections: Vec<CollectionRef>,
    /// (owning collection id, folder)
    folders: Vec<(String, FolderRef)>,
    /// (direct container id, request)
    requests: Vec<(String, CollectionRequest)>,
}

/// In-memory collection tree.
#[derive(Default)]
pub struct InMemoryCollectionStore {
    inner: RwLock<CollectionTree>,
}

impl InMemoryCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(self, collection: CollectionRef) -> Self {
        if let Ok(mut inner) = self.inner.write() {
            inner.collections.push(collection);
        }
        self
    }

    pub fn with_folder(self, collection_id: impl Into<String>, folder: FolderRef) -> Self {
        if let Ok(mut inner) = self.inner.write() {
            inner.folders.push((collection_id.into(), folder));
        }
        self
    }

    pub fn with_request(self, container_id: impl Into<String>, request: CollectionRequest) -> Self {
        if let Ok(mut inner) = self.inner.write() {
            inner.requests.push((container_id.into(), request));
        }
        self
    }
}

fn sort_folders(folders: &mut [FolderRef]) {
    folders.sort_by(|a, b| a.sort_key.total_cmp(&b.sort_key).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl CollectionStore for InMemoryCollectionStore {
    async fn requests_in(&self, container_id: &str) -> Result<Vec<CollectionRequest>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut requests: Vec<CollectionRequest> = inner
            .requests
            .iter()
            .filter(|(container, _)| container == container_id)
            .map(|(_, request)| request.clone())
            .collect();
        requests.sort_by(|a, b| a.sort_key.total_cmp(&b.sort_key).then_with(|| a.id.cmp(&b.id)));
        Ok(requests)
    }

    async fn child_folders(&self, container_id: &str) -> Result<Vec<FolderRef>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let is_collection = inner.collections.iter().any(|c| c.id == container_id);
        let mut folders: Vec<FolderRef> = inner
            .folders
            .iter()
            .filter(|(collection, folder)| {
                if is_collection {
                    collection == container_id && folder.parent_id.is_none()
                } else {
                    folder.parent_id.as_deref() == Some(container_id)
                }
            })
            .map(|(_, folder)| folder.clone())
            .collect();
        sort_folders(&mut folders);
        Ok(folders)
    }

    async fn folders(&self, collection_id: &str) -> Result<Vec<FolderRef>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut folders: Vec<FolderRef> = inner
            .folders
            .iter()
            .filter(|(collection, _)| collection == collection_id)
            .map(|(_, folder)| folder.clone())
            .collect();
        sort_folders(&mut folders);
        Ok(folders)
    }

    async fn root_collection_for(&self, id: &str) -> Result<CollectionRef> {
        let inner = self.inner.read().map_err(poisoned)?;
        if let Some(collection) = inner.collections.iter().find(|c| c.id == id) {
            return Ok(collection.clone());
        }
        if let Some((collection_id, _)) = inner.folders.iter().find(|(_, f)| f.id == id) {
            if let Some(collection) = inner.collections.iter().find(|c| &c.id == collection_id) {
                return Ok(collection.clone());
            }
        }
        Err(WaypostError::Store(format!(
            "unknown collection or folder: {}",
            id
        )))
    }
}

/// Discards every record, for callers that keep no history.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

#[async_trait]
impl HistorySink for NoHistory {
    async fn record(&self, _result: &ExecutionResult) -> Result<()> {
        Ok(())
    }
}

/// Keeps every record in memory, in arrival order.
#[derive(Default)]
pub struct InMemoryHistory {
    records: RwLock<Vec<ExecutionResult>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ExecutionResult> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistorySink for InMemoryHistory {
    async fn record(&self, result: &ExecutionResult) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VarUpdate;

    #[tokio::test]
    async fn test_variable_store_read_after_write() {
        let store = InMemoryVariableStore::new().with_scope(
            ScopeId::Environment("env1".to_string()),
            vec![Variable::new("token", "old")],
        );

        let mut updates = VariableUpdates::new();
        updates.insert("token".to_string(), VarUpdate::Set { value: "new".to_string() });
        updates.insert("extra".to_string(), VarUpdate::Set { value: "1".to_string() });

        let scope = ScopeId::Environment("env1".to_string());
        store.apply_updates(&scope, &updates).await.unwrap();

        let vars = store.scope_variables(&scope).await.unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].value, "new");
    }

    #[tokio::test]
    async fn test_unknown_scope_is_empty() {
        let store = InMemoryVariableStore::new();
        let vars = store
            .scope_variables(&ScopeId::Collection("nope".to_string()))
            .await
            .unwrap();
        assert!(vars.is_empty());
    }

    #[tokio::test]
    async fn test_workspace_linkage() {
        let env = ScopeId::Environment("env1".to_string());
        let store = InMemoryVariableStore::new().link_workspace(env.clone(), "ws1");

        assert_eq!(store.workspace_of(&env).await.unwrap().as_deref(), Some("ws1"));
        assert_eq!(
            store
                .workspace_of(&ScopeId::Workspace("ws9".to_string()))
                .await
                .unwrap()
                .as_deref(),
            Some("ws9")
        );
        assert_eq!(
            store
                .workspace_of(&ScopeId::Collection("c1".to_string()))
                .await
                .unwrap(),
            None
        );
    }

    fn tree() -> InMemoryCollectionStore {
        InMemoryCollectionStore::new()
            .with_collection(CollectionRef::new("c1", "API"))
            .with_folder("c1", FolderRef::new("f-users", "Users").sorted(1.0))
            .with_folder("c1", FolderRef::new("f-admin", "Admin").sorted(2.0))
            .with_folder("c1", FolderRef::new("f-roles", "Roles").under("f-admin"))
            .with_request(
                "c1",
                CollectionRequest::new("r-health", "Health", RequestConfig::default()).sorted(0.5),
            )
            .with_request(
                "f-users",
                CollectionRequest::new("r-list", "List users", RequestConfig::default()),
            )
    }

    #[tokio::test]
    async fn test_child_folders_is_one_level() {
        let store = tree();
        let top = store.child_folders("c1").await.unwrap();
        let names: Vec<&str> = top.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Users", "Admin"]);

        let nested = store.child_folders("f-admin").await.unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].id, "f-roles");
    }

    #[tokio::test]
    async fn test_flat_folder_listing_covers_all_depths() {
        let store = tree();
        let all = store.folders("c1").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_root_collection_for_folder_and_collection() {
        let store = tree();
        assert_eq!(store.root_collection_for("c1").await.unwrap().id, "c1");
        assert_eq!(store.root_collection_for("f-roles").await.unwrap().id, "c1");
        assert!(store.root_collection_for("ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_requests_in_sorted_by_key() {
        let store = InMemoryCollectionStore::new()
            .with_collection(CollectionRef::new("c1", "API"))
            .with_request(
                "c1",
                CollectionRequest::new("r-b", "Second", RequestConfig::default()).sorted(2.0),
            )
            .with_request(
                "c1",
                CollectionRequest::new("r-a", "First", RequestConfig::default()).sorted(1.0),
            );

        let requests = store.requests_in("c1").await.unwrap();
        let names: Vec<&str> = requests.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["First", "Second"]);
    }
}
