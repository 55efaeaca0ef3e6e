//! Create-or-update of a single derived resource.
//!
//! `apply_or_create` fetches the object, runs the mutation on the fetched copy
//! (or on an empty object carrying only the identity), stamps the owner
//! reference and writes the result guarded by the fetched `resourceVersion`.
//! A version conflict, or losing a create race, is retried exactly once.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use resource_store::{ObjectStore, StoreError};
use tracing::{debug, warn};

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied<K> {
    /// The object did not exist and was created
    Created(K),
    /// The object existed and was updated
    Updated(K),
    /// The object already matched the desired state; nothing was written
    Unchanged(K),
}

impl<K> Applied<K> {
    /// The object as persisted.
    #[cfg(test)]
    pub fn into_inner(self) -> K {
        match self {
            Applied::Created(obj) | Applied::Updated(obj) | Applied::Unchanged(obj) => obj,
        }
    }

    /// The object as persisted, by reference.
    pub fn object(&self) -> &K {
        match self {
            Applied::Created(obj) | Applied::Updated(obj) | Applied::Unchanged(obj) => obj,
        }
    }

    /// Short label for logs and metrics.
    pub fn result(&self) -> &'static str {
        match self {
            Applied::Created(_) => "created",
            Applied::Updated(_) => "updated",
            Applied::Unchanged(_) => "unchanged",
        }
    }

    /// Whether a write was issued.
    pub fn wrote(&self) -> bool {
        !matches!(self, Applied::Unchanged(_))
    }
}

/// Errors worth one more fetch-mutate-write round.
fn is_retryable(err: &StoreError) -> bool {
    matches!(err, StoreError::Conflict(_) | StoreError::AlreadyExists(_))
}

/// Creates or updates `namespace/name` so that `mutate` has been applied to it.
///
/// `mutate` must only set the fields it owns: it runs on whatever is
/// currently persisted and must not assume defaults.
pub async fn apply_or_create<K, F>(
    store: &dyn ObjectStore<K>,
    namespace: &str,
    name: &str,
    owner: &OwnerReference,
    mutate: F,
) -> Result<Applied<K>, StoreError>
where
    K: Resource + Clone + Default + PartialEq + Send + Sync + 'static,
    F: Fn(&mut K) + Send + Sync,
{
    match apply_once(store, namespace, name, owner, &mutate).await {
        Err(err) if is_retryable(&err) => {
            warn!("Write of {}/{} raced with another writer, retrying once: {}", namespace, name, err);
            apply_once(store, namespace, name, owner, &mutate).await
        }
        other => other,
    }
}

async fn apply_once<K, F>(
    store: &dyn ObjectStore<K>,
    namespace: &str,
    name: &str,
    owner: &OwnerReference,
    mutate: &F,
) -> Result<Applied<K>, StoreError>
where
    K: Resource + Clone + Default + PartialEq + Send + Sync + 'static,
    F: Fn(&mut K) + Send + Sync,
{
    match store.get(namespace, name).await? {
        None => {
            let mut obj = K::default();
            let meta = obj.meta_mut();
            meta.name = Some(name.to_string());
            meta.namespace = Some(namespace.to_string());
            mutate(&mut obj);
            set_owner_reference(obj.meta_mut(), owner)?;

            let created = store.create(namespace, &obj).await?;
            Ok(Applied::Created(created))
        }
        Some(current) => {
            let mut obj = current.clone();
            mutate(&mut obj);
            set_owner_reference(obj.meta_mut(), owner)?;

            if obj == current {
                debug!("{}/{} already up to date", namespace, name);
                return Ok(Applied::Unchanged(current));
            }
            let updated = store.replace(namespace, &obj).await?;
            Ok(Applied::Updated(updated))
        }
    }
}

/// Makes `owner` the controller reference of `meta`.
///
/// A reference with the same uid is replaced, other non-controller references
/// are kept. Fails if a different object already controls `meta`.
pub fn set_owner_reference(meta: &mut ObjectMeta, owner: &OwnerReference) -> Result<(), StoreError> {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);

    if let Some(other) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(StoreError::Invalid(format!(
            "{} is already controlled by {} {}",
            meta.name.as_deref().unwrap_or("<unnamed>"),
            other.kind,
            other.name
        )));
    }

    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) => *existing = owner.clone(),
        None => refs.push(owner.clone()),
    }
    Ok(())
}
