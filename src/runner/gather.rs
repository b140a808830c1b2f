//! Collecting the requests a run will execute.

use std::collections::HashSet;

use crate::errors::Result;
use crate::stores::{CollectionRequest, CollectionStore, FolderRef};

/// Requests under `container_id`, depth first: a container's own
/// requests come before those of its subfolders, with folders visited
/// in sibling order. The whole tree comes from one flat folder query.
pub async fn gather_requests(
    store: &dyn CollectionStore,
    collection_id: &str,
    container_id: &str,
) -> Result<Vec<CollectionRequest>> {
    let folders = store.folders(collection_id).await?;

    let mut gathered = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = vec![container_id.to_string()];
    while let Some(current) = stack.pop() {
        // Guards against parent cycles in stored folder data
        if !seen.insert(current.clone()) {
            continue;
        }
        gathered.extend(store.requests_in(&current).await?);
        for child in children_of(&folders, collection_id, &current).into_iter().rev() {
            stack.push(child);
        }
    }
    Ok(gathered)
}

fn children_of(folders: &[FolderRef], collection_id: &str, container_id: &str) -> Vec<String> {
    let mut children: Vec<&FolderRef> = folders
        .iter()
        .filter(|folder| {
            if container_id == collection_id {
                folder.parent_id.is_none()
            } else {
                folder.parent_id.as_deref() == Some(container_id)
            }
        })
        .collect();
    children.sort_by(|a, b| a.sort_key.total_cmp(&b.sort_key).then_with(|| a.id.cmp(&b.id)));
    children.into_iter().map(|folder| folder.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestConfig;
    use crate::stores::{CollectionRef, InMemoryCollectionStore};

    fn request(id: &str, name: &str) -> CollectionRequest {
        CollectionRequest::new(id, name, RequestConfig::default())
    }

    fn store() -> InMemoryCollectionStore {
        InMemoryCollectionStore::new()
            .with_collection(CollectionRef::new("c1", "API"))
            .with_folder("c1", FolderRef::new("f-auth", "Auth").sorted(1.0))
            .with_folder("c1", FolderRef::new("f-users", "Users").sorted(2.0))
            .with_folder("c1", FolderRef::new("f-admin", "Admin").under("f-users").sorted(1.0))
            .with_request("c1", request("r-health", "Health").sorted(1.0))
            .with_request("f-auth", request("r-login", "Login").sorted(1.0))
            .with_request("f-auth", request("r-refresh", "Refresh").sorted(2.0))
            .with_request("f-users", request("r-list", "List users").sorted(1.0))
            .with_request("f-admin", request("r-grant", "Grant role").sorted(1.0))
    }

    #[tokio::test]
    async fn test_collection_order_is_depth_first() {
        let store = store();
        let gathered = gather_requests(&store, "c1", "c1").await.unwrap();
        let names: Vec<&str> = gathered.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            ["Health", "Login", "Refresh", "List users", "Grant role"]
        );
    }

    #[tokio::test]
    async fn test_folder_target_covers_only_its_subtree() {
        let store = store();
        let gathered = gather_requests(&store, "c1", "f-users").await.unwrap();
        let names: Vec<&str> = gathered.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["List users", "Grant role"]);
    }

    #[tokio::test]
    async fn test_empty_container_gathers_nothing() {
        let store = InMemoryCollectionStore::new()
            .with_collection(CollectionRef::new("c1", "API"))
            .with_folder("c1", FolderRef::new("f-empty", "Empty"));
        let gathered = gather_requests(&store, "c1", "f-empty").await.unwrap();
        assert!(gathered.is_empty());
    }
}
