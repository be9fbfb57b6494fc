//! Resource store persisted through a [`KeyValueBackend`].

use super::{KeyValueBackend, ResourceStore};
use crate::error::Result;
use crate::resource::{is_reserved_key, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// A namespaced, JSON-encoded resource store.
///
/// With a namespace `app`, the resource `posts/1` lives under the backend
/// key `app.posts/1`. Reserved keys (leading `_`) share the namespace but
/// are never listed by [`ResourceStore::keys`].
///
/// `.` separates the namespace from the key, so resource types of a store
/// without a namespace must not contain it. Such a store treats any backend
/// key whose type segment holds a `.` as belonging to another namespace.
#[derive(Clone)]
pub struct DurableStore {
    backend: Arc<dyn KeyValueBackend>,
    namespace: Option<String>,
}

impl DurableStore {
    /// Create a store over `backend` without a namespace.
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            backend,
            namespace: None,
        }
    }

    /// Create a store whose keys live under `namespace`.
    pub fn with_namespace(backend: Arc<dyn KeyValueBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: Some(namespace.into()),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueBackend> {
        &self.backend
    }

    fn namespaced(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{key}"),
            None => key.to_string(),
        }
    }

    /// Read and decode any JSON value, reserved keys included.
    ///
    /// A value that no longer decodes is reported and treated as absent.
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.backend.get(&self.namespaced(key))? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding undecodable stored value");
                Ok(None)
            }
        }
    }

    /// Encode and write any JSON value, reserved keys included.
    pub fn insert_value<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.backend.set(&self.namespaced(key), &bytes)
    }

    /// Every key inside this store's namespace, reserved ones included.
    pub fn all_keys(&self) -> Result<Vec<String>> {
        let keys = self.backend.keys()?;
        let keys = match &self.namespace {
            Some(ns) => {
                let prefix = format!("{ns}.");
                keys.into_iter()
                    .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
                    .collect()
            }
            None => keys.into_iter().filter(|key| !is_namespaced(key)).collect(),
        };
        Ok(keys)
    }
}

/// Whether `key` carries a namespace prefix, checked on the segment before
/// the first `/`.
fn is_namespaced(key: &str) -> bool {
    key.split('/').next().is_some_and(|head| head.contains('.'))
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ResourceStore for DurableStore {
    fn get_item(&self, key: &str) -> Result<Option<Resource>> {
        self.get_value(key)
    }

    fn insert_item(&mut self, key: &str, value: Resource) -> Result<()> {
        self.insert_value(key, &value)
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        self.backend.remove(&self.namespaced(key))
    }

    fn has_item(&self, key: &str) -> Result<bool> {
        self.backend.contains(&self.namespaced(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .all_keys()?
            .into_iter()
            .filter(|key| !is_reserved_key(key))
            .collect())
    }
}
