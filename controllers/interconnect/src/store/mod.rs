//! Object store seam.
//!
//! Reconcilers read and write cluster state through [`ObjectStore`] instead of
//! `kube::Api` directly. [`KubeStore`] is the production implementation;
//! [`memory::MemoryStore`] keeps objects in memory with the same
//! resourceVersion, finalizer and deletion-timestamp rules for tests.

pub mod memory;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::core::{ClusterResourceScope, NamespaceResourceScope};
use kube::{Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

pub use memory::MemoryStore;

/// Objects that can live in an [`ObjectStore`]
pub trait StoredObject:
    Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
}

impl<K> StoredObject for K where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
}

/// Namespace and name of an object; `namespace` is `None` for cluster-scoped kinds
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    /// Key of a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of a namespaced object
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of `obj`; the name is empty if unset
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.meta().namespace.clone(),
            name: obj.meta().name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Object store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// resourceVersion mismatch on a write
    #[error("conflict: {0}")]
    Conflict(String),

    /// An object with the same name exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Object cannot be written as given
    #[error("invalid object: {0}")]
    Invalid(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),

    /// Object failed to (de)serialize
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    /// Classify an API error for `what`
    pub fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(what.to_string()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                StoreError::AlreadyExists(what.to_string())
            }
            kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(what.to_string()),
            other => StoreError::Kube(other),
        }
    }
}

/// Read/write access to one kind of object
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Clone + Send + Sync + 'static,
{
    /// Fetch by key; `None` when absent
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, StoreError>;

    /// All objects carrying every `(key, value)` label; all objects when empty
    async fn list(&self, labels: &[(&str, &str)]) -> Result<Vec<K>, StoreError>;

    /// Create `obj`; its status is ignored
    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace metadata and spec; status is left untouched
    async fn update(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace status only
    async fn update_status(&self, obj: &K) -> Result<K, StoreError>;

    /// Delete by key. Objects with finalizers are only marked for deletion.
    /// Deleting an absent object succeeds.
    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;
}

/// Render `labels` as an equality label selector
pub fn label_selector(labels: &[(&str, &str)]) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`ObjectStore`] backed by the Kubernetes API
pub struct KubeStore<K> {
    client: Client,
    api: fn(Client, Option<&str>) -> Api<K>,
}

impl<K: Resource> fmt::Debug for KubeStore<K>
where
    K::DynamicType: Default,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore")
            .field("kind", &K::kind(&K::DynamicType::default()))
            .finish()
    }
}

impl<K: StoredObject> KubeStore<K> {
    /// Store for a cluster-scoped kind
    pub fn cluster_scoped(client: Client) -> Self
    where
        K: Resource<Scope = ClusterResourceScope>,
    {
        fn api<K: StoredObject>(client: Client, _namespace: Option<&str>) -> Api<K> {
            Api::all(client)
        }
        Self { client, api: api::<K> }
    }

    /// Store for a namespaced kind; lists span all namespaces
    pub fn namespaced(client: Client) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        fn api<K: StoredObject + Resource<Scope = NamespaceResourceScope>>(
            client: Client,
            namespace: Option<&str>,
        ) -> Api<K> {
            match namespace {
                Some(ns) => Api::namespaced(client, ns),
                None => Api::all(client),
            }
        }
        Self { client, api: api::<K> }
    }

    fn api(&self, namespace: Option<&str>) -> Api<K> {
        (self.api)(self.client.clone(), namespace)
    }

    fn name_of(obj: &K) -> Result<String, StoreError> {
        obj.meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Invalid(format!("{} without a name", K::kind(&()))))
    }
}

#[async_trait]
impl<K: StoredObject> ObjectStore<K> for KubeStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        self.api(key.namespace.as_deref())
            .get_opt(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(e, &key.to_string()))
    }

    async fn list(&self, labels: &[(&str, &str)]) -> Result<Vec<K>, StoreError> {
        let mut params = ListParams::default();
        if !labels.is_empty() {
            params = params.labels(&label_selector(labels));
        }
        let list = self
            .api(None)
            .list(&params)
            .await
            .map_err(|e| StoreError::from_kube(e, &K::kind(&())))?;
        Ok(list.items)
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        self.api(key.namespace.as_deref())
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, &key.to_string()))
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let name = Self::name_of(obj)?;
        let key = ObjectKey::of(obj);
        self.api(key.namespace.as_deref())
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, &key.to_string()))
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        let name = Self::name_of(obj)?;
        let key = ObjectKey::of(obj);
        // The full object carries resourceVersion, so a stale writer gets a 409.
        let data = serde_json::to_vec(obj)?;
        self.api(key.namespace.as_deref())
            .replace_status(&name, &PostParams::default(), data)
            .await
            .map_err(|e| StoreError::from_kube(e, &key.to_string()))
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        match self
            .api(key.namespace.as_deref())
            .delete(&key.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => match StoreError::from_kube(e, &key.to_string()) {
                StoreError::NotFound(_) => Ok(()),
                other => Err(other),
            },
        }
    }
}
