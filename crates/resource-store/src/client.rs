//! Kubernetes-backed object store

use crate::error::StoreError;
use crate::store_trait::ObjectStore;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// Object store that talks to the Kubernetes API server.
///
/// One `KubeStore` serves every namespace; an `Api<K>` is scoped per call.
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    /// Creates a store for `K` using the given client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl<K> Clone for KubeStore<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("kind", &std::any::type_name::<K>())
            .finish()
    }
}

/// Name and version token of an object about to be written.
fn write_target<K: Resource>(obj: &K) -> Result<(&str, &str), StoreError> {
    let meta = obj.meta();
    let name = meta
        .name
        .as_deref()
        .ok_or_else(|| StoreError::Invalid("object has no name".to_string()))?;
    let version = meta
        .resource_version
        .as_deref()
        .ok_or_else(|| StoreError::Invalid(format!("{name} has no resourceVersion")))?;
    Ok((name, version))
}

#[async_trait::async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        Ok(self.api(namespace).create(&PostParams::default(), obj).await?)
    }

    async fn replace(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let (name, version) = write_target(obj)?;
        debug!("Replacing {}/{} at resourceVersion {}", namespace, name, version);
        Ok(self
            .api(namespace)
            .replace(name, &PostParams::default(), obj)
            .await?)
    }

    async fn replace_status(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let (name, version) = write_target(obj)?;
        let status = serde_json::to_value(obj)?
            .get("status")
            .cloned()
            .ok_or_else(|| StoreError::Invalid(format!("{name} has no status to write")))?;

        // A merge patch carrying resourceVersion is rejected with 409 when stale
        let status_patch = serde_json::json!({
            "metadata": { "resourceVersion": version },
            "status": status,
        });

        debug!("Replacing status of {}/{} at resourceVersion {}", namespace, name, version);
        Ok(self
            .api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch))
            .await?)
    }
}
