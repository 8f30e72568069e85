//! In-memory object store
//!
//! Mirrors the API-server rules the reconcilers depend on:
//! - every write bumps `resourceVersion`; a write carrying a stale one is a conflict
//! - `create` assigns uid and creation timestamp and drops the status
//! - `update` never touches status and `update_status` never touches anything else
//! - `delete` of an object with finalizers only sets `deletionTimestamp`; the
//!   object goes away once an update removes the last finalizer

use super::{ObjectKey, ObjectStore, StoreError, StoredObject};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// uids are unique across every store in the process
static NEXT_UID: AtomicU64 = AtomicU64::new(1);

struct State<K> {
    objects: BTreeMap<ObjectKey, K>,
    revision: u64,
    writes: usize,
}

/// Object store holding objects in memory
///
/// Cloning is cheap; clones share the same objects.
pub struct MemoryStore<K> {
    state: Arc<Mutex<State<K>>>,
}

impl<K> Clone for MemoryStore<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                objects: BTreeMap::new(),
                revision: 0,
                writes: 0,
            })),
        }
    }
}

impl<K> fmt::Debug for MemoryStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryStore")
            .field("objects", &state.objects.len())
            .field("revision", &state.revision)
            .finish()
    }
}

/// Current time as a metadata timestamp
pub(crate) fn now() -> Result<Time, StoreError> {
    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    Ok(serde_json::from_value(Value::String(stamp))?)
}

/// `target` with the status of `source`
fn with_status_of<K: StoredObject>(target: &K, source: Option<&K>) -> Result<K, StoreError> {
    let mut value = serde_json::to_value(target)?;
    let status = match source {
        Some(source) => serde_json::to_value(source)?
            .get_mut("status")
            .map(Value::take)
            .unwrap_or(Value::Null),
        None => Value::Null,
    };
    if let Some(map) = value.as_object_mut() {
        if status.is_null() {
            map.remove("status");
        } else {
            map.insert("status".to_string(), status);
        }
    }
    Ok(serde_json::from_value(value)?)
}

impl<K> MemoryStore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }
}

impl<K: StoredObject> MemoryStore<K> {
    /// Store `obj` as-is, status included, filling in uid and resourceVersion
    /// when missing. Replaces any object with the same key.
    pub fn insert(&self, mut obj: K) -> K {
        let mut state = self.lock();
        state.revision += 1;
        let revision = state.revision.to_string();
        let meta = obj.meta_mut();
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{}", NEXT_UID.fetch_add(1, Ordering::Relaxed)));
        }
        meta.resource_version = Some(revision);
        state.objects.insert(ObjectKey::of(&obj), obj.clone());
        obj
    }

    /// Synchronous lookup for assertions
    pub fn snapshot(&self, key: &ObjectKey) -> Option<K> {
        self.lock().objects.get(key).cloned()
    }

    /// Every stored object
    pub fn all(&self) -> Vec<K> {
        self.lock().objects.values().cloned().collect()
    }

    fn check_version(stored: &K, obj: &K, key: &ObjectKey) -> Result<(), StoreError> {
        match &obj.meta().resource_version {
            Some(rv) if Some(rv) != stored.meta().resource_version.as_ref() => {
                Err(StoreError::Conflict(key.to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl<K: StoredObject> ObjectStore<K> for MemoryStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        Ok(self.lock().objects.get(key).cloned())
    }

    async fn list(&self, labels: &[(&str, &str)]) -> Result<Vec<K>, StoreError> {
        let state = self.lock();
        Ok(state
            .objects
            .values()
            .filter(|obj| {
                let own = obj.meta().labels.as_ref();
                labels
                    .iter()
                    .all(|(k, v)| own.and_then(|l| l.get(*k)).is_some_and(|value| value == v))
            })
            .cloned()
            .collect())
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        if key.name.is_empty() {
            return Err(StoreError::Invalid(format!("{} without a name", K::kind(&()))));
        }
        let mut created = with_status_of(obj, None)?;
        let timestamp = now()?;

        let mut state = self.lock();
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        state.revision += 1;
        state.writes += 1;
        let meta = created.meta_mut();
        meta.uid = Some(format!("uid-{}", NEXT_UID.fetch_add(1, Ordering::Relaxed)));
        meta.resource_version = Some(state.revision.to_string());
        meta.creation_timestamp = Some(timestamp);
        meta.deletion_timestamp = None;
        state.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let mut state = self.lock();
        let stored = state
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Self::check_version(stored, obj, &key)?;

        let mut updated = with_status_of(obj, Some(stored))?;
        {
            let stored_meta = stored.meta();
            let meta = updated.meta_mut();
            meta.uid.clone_from(&stored_meta.uid);
            meta.creation_timestamp.clone_from(&stored_meta.creation_timestamp);
            meta.deletion_timestamp.clone_from(&stored_meta.deletion_timestamp);
        }
        state.revision += 1;
        state.writes += 1;
        updated.meta_mut().resource_version = Some(state.revision.to_string());

        let released = updated.meta().deletion_timestamp.is_some()
            && updated.meta().finalizers.as_ref().is_none_or(Vec::is_empty);
        if released {
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let mut state = self.lock();
        let stored = state
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Self::check_version(stored, obj, &key)?;

        let mut updated = with_status_of(stored, Some(obj))?;
        state.revision += 1;
        state.writes += 1;
        updated.meta_mut().resource_version = Some(state.revision.to_string());
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let timestamp = now()?;
        let mut state = self.lock();
        let Some(stored) = state.objects.get(key) else {
            return Ok(());
        };
        let has_finalizers = stored.meta().finalizers.as_ref().is_some_and(|f| !f.is_empty());
        if !has_finalizers {
            state.objects.remove(key);
            state.writes += 1;
            return Ok(());
        }
        if stored.meta().deletion_timestamp.is_some() {
            return Ok(());
        }
        state.revision += 1;
        state.writes += 1;
        let revision = state.revision.to_string();
        if let Some(stored) = state.objects.get_mut(key) {
            let meta = stored.meta_mut();
            meta.deletion_timestamp = Some(timestamp);
            meta.resource_version = Some(revision);
        }
        Ok(())
    }
}
