//! Mock ObjectStore for unit testing
//!
//! This module provides an in-memory implementation of `ObjectStore` that
//! behaves like the API server where the controller cares: version tokens
//! are compared on every write, uids are assigned on create, and status is
//! only written through `replace_status`. Faults can be queued to exercise
//! conflict and error paths.

use crate::error::StoreError;
use crate::store_trait::ObjectStore;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

type Key = (String, String);

#[derive(Default)]
struct Faults {
    get: VecDeque<StoreError>,
    create: VecDeque<StoreError>,
    replace: VecDeque<StoreError>,
    replace_status: VecDeque<StoreError>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    creates: usize,
    replaces: usize,
    status_writes: usize,
}

/// Mock object store for testing
///
/// Clones share the same underlying storage.
pub struct MockStore<K> {
    objects: Arc<Mutex<BTreeMap<Key, K>>>,
    next_version: Arc<Mutex<u64>>,
    faults: Arc<Mutex<Faults>>,
    counters: Arc<Mutex<Counters>>,
}

impl<K> Clone for MockStore<K> {
    fn clone(&self) -> Self {
        Self {
            objects: self.objects.clone(),
            next_version: self.next_version.clone(),
            faults: self.faults.clone(),
            counters: self.counters.clone(),
        }
    }
}

impl<K> Default for MockStore<K> {
    fn default() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            next_version: Arc::new(Mutex::new(1)),
            faults: Arc::new(Mutex::new(Faults::default())),
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }
}

impl<K> std::fmt::Debug for MockStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("objects", &self.objects.lock().unwrap().len())
            .field("counters", &*self.counters.lock().unwrap())
            .finish()
    }
}

impl<K> MockStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned,
{
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate next resourceVersion
    fn bump_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        let current = *version;
        *version += 1;
        current.to_string()
    }

    fn key(namespace: &str, name: &str) -> Key {
        (namespace.to_string(), name.to_string())
    }

    /// Seed an object (for test setup).
    ///
    /// Assigns a uid if missing and always a fresh resourceVersion.
    /// Returns the stored copy.
    pub fn insert(&self, mut obj: K) -> K {
        let namespace = obj.meta().namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = obj.meta().name.clone().unwrap_or_default();
        let version = self.bump_version();
        let meta = obj.meta_mut();
        meta.namespace = Some(namespace.clone());
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        meta.resource_version = Some(version);
        self.objects
            .lock()
            .unwrap()
            .insert(Self::key(&namespace, &name), obj.clone());
        obj
    }

    /// Mutate a stored object as another writer would (bumps resourceVersion).
    ///
    /// Returns the new stored copy, or `None` if the object does not exist.
    pub fn modify(&self, namespace: &str, name: &str, f: impl FnOnce(&mut K)) -> Option<K> {
        let version = self.bump_version();
        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get_mut(&Self::key(namespace, name))?;
        f(obj);
        obj.meta_mut().resource_version = Some(version);
        Some(obj.clone())
    }

    /// Remove an object (simulates external deletion)
    pub fn remove(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects.lock().unwrap().remove(&Self::key(namespace, name))
    }

    /// Snapshot of a stored object (for assertions)
    pub fn fetch(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects.lock().unwrap().get(&Self::key(namespace, name)).cloned()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue an error for the next `get`
    pub fn fail_next_get(&self, err: StoreError) {
        self.faults.lock().unwrap().get.push_back(err);
    }

    /// Queue an error for the next `create`
    pub fn fail_next_create(&self, err: StoreError) {
        self.faults.lock().unwrap().create.push_back(err);
    }

    /// Queue an error for the next `replace`
    pub fn fail_next_replace(&self, err: StoreError) {
        self.faults.lock().unwrap().replace.push_back(err);
    }

    /// Queue an error for the next `replace_status`
    pub fn fail_next_replace_status(&self, err: StoreError) {
        self.faults.lock().unwrap().replace_status.push_back(err);
    }

    /// Make the next `n` replaces fail with a version conflict
    pub fn conflict_next_replaces(&self, n: usize) {
        for _ in 0..n {
            self.fail_next_replace(StoreError::Conflict("injected conflict".to_string()));
        }
    }

    /// Make the next `n` status writes fail with a version conflict
    pub fn conflict_next_status_writes(&self, n: usize) {
        for _ in 0..n {
            self.fail_next_replace_status(StoreError::Conflict("injected conflict".to_string()));
        }
    }

    /// Successful creates so far
    pub fn create_count(&self) -> usize {
        self.counters.lock().unwrap().creates
    }

    /// Successful replaces so far
    pub fn replace_count(&self) -> usize {
        self.counters.lock().unwrap().replaces
    }

    /// Successful status writes so far
    pub fn status_write_count(&self) -> usize {
        self.counters.lock().unwrap().status_writes
    }

    /// Checks the caller's version token against the stored object.
    fn check_version(stored: &K, incoming: &K, what: &str) -> Result<(), StoreError> {
        match incoming.meta().resource_version.as_deref() {
            None => Err(StoreError::Invalid(format!("{what} has no resourceVersion"))),
            Some(v) if Some(v) != stored.meta().resource_version.as_deref() => Err(
                StoreError::Conflict(format!(
                    "{what}: resourceVersion {v} is stale (stored {})",
                    stored.meta().resource_version.as_deref().unwrap_or("<none>")
                )),
            ),
            Some(_) => Ok(()),
        }
    }
}

/// Copies the `status` field of `source` onto `target` (or clears it).
fn with_status_of<K: Serialize + DeserializeOwned>(target: &K, source: &K) -> Result<K, StoreError> {
    let mut target_value = serde_json::to_value(target)?;
    let source_value = serde_json::to_value(source)?;
    if let Some(map) = target_value.as_object_mut() {
        match source_value.get("status") {
            Some(status) => {
                map.insert("status".to_string(), status.clone());
            }
            None => {
                map.remove("status");
            }
        }
    }
    Ok(serde_json::from_value(target_value)?)
}

fn name_of<K: Resource>(obj: &K) -> Result<String, StoreError> {
    obj.meta()
        .name
        .clone()
        .ok_or_else(|| StoreError::Invalid("object has no name".to_string()))
}

#[async_trait::async_trait]
impl<K> ObjectStore<K> for MockStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        if let Some(err) = self.faults.lock().unwrap().get.pop_front() {
            return Err(err);
        }
        Ok(self.fetch(namespace, name))
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        if let Some(err) = self.faults.lock().unwrap().create.pop_front() {
            return Err(err);
        }
        let name = name_of(obj)?;
        if obj.meta().resource_version.is_some() {
            return Err(StoreError::Invalid(format!(
                "{namespace}/{name}: resourceVersion must not be set on create"
            )));
        }

        let version = self.bump_version();
        let mut objects = self.objects.lock().unwrap();
        let key = Self::key(namespace, &name);
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{namespace}/{name}")));
        }

        let mut created = obj.clone();
        let meta = created.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
        meta.resource_version = Some(version);
        objects.insert(key, created.clone());
        self.counters.lock().unwrap().creates += 1;
        Ok(created)
    }

    async fn replace(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        if let Some(err) = self.faults.lock().unwrap().replace.pop_front() {
            return Err(err);
        }
        let name = name_of(obj)?;
        let version = self.bump_version();
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&Self::key(namespace, &name))
            .ok_or_else(|| StoreError::NotFound(format!("{namespace}/{name}")))?;
        Self::check_version(stored, obj, &format!("{namespace}/{name}"))?;

        // Status is owned by the status subresource; uid is immutable
        let mut replaced = with_status_of(obj, stored)?;
        let uid = stored.meta().uid.clone();
        let meta = replaced.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.uid = uid;
        meta.resource_version = Some(version);
        *stored = replaced.clone();
        self.counters.lock().unwrap().replaces += 1;
        Ok(replaced)
    }

    async fn replace_status(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        if let Some(err) = self.faults.lock().unwrap().replace_status.pop_front() {
            return Err(err);
        }
        let name = name_of(obj)?;
        let version = self.bump_version();
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&Self::key(namespace, &name))
            .ok_or_else(|| StoreError::NotFound(format!("{namespace}/{name}")))?;
        Self::check_version(stored, obj, &format!("{namespace}/{name}"))?;

        let mut updated = with_status_of(stored, obj)?;
        updated.meta_mut().resource_version = Some(version);
        *stored = updated.clone();
        self.counters.lock().unwrap().status_writes += 1;
        Ok(updated)
    }
}
