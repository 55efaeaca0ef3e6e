//! ObjectStore trait for mocking
//!
//! This trait abstracts the Kubernetes API so reconcilers can be unit tested
//! against an in-memory store. `KubeStore` implements it for real clusters.

use crate::error::StoreError;

/// Versioned get/create/replace access to one kind of namespaced object.
///
/// Writes never lock. `replace` and `replace_status` carry the version token
/// read by an earlier `get` (`metadata.resourceVersion`); if the stored
/// version has moved on, they fail with [`StoreError::Conflict`] and the
/// caller decides whether to re-fetch and retry.
#[async_trait::async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Clone + Send + Sync + 'static,
{
    /// Fetches an object. `Ok(None)` when it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    /// Creates a new object. Fails with `AlreadyExists` if the name is taken.
    async fn create(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    /// Replaces an object, guarded by its `resourceVersion`.
    async fn replace(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    /// Replaces only the status of an object, guarded by its `resourceVersion`.
    async fn replace_status(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;
}
