//! In-memory snapshot a batch runs against.
//!
//! The overlay reads durable storage once when it is taken and writes it
//! once when it is deployed; everything in between stays in memory, so
//! readers of the durable store never observe a half-applied batch.

use super::{DurableStore, ResourceStore};
use crate::error::Result;
use crate::resource::{is_reserved_key, Resource};
use std::collections::BTreeMap;

/// Copy-on-write view over a [`DurableStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overlay {
    data: BTreeMap<String, Resource>,
}

impl Overlay {
    /// An overlay with no content.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Copy every application key of `store` into memory.
    pub fn snapshot(store: &DurableStore) -> Result<Self> {
        let mut data = BTreeMap::new();
        for key in store.keys()? {
            if let Some(value) = store.get_item(&key)? {
                data.insert(key, value);
            }
        }
        Ok(Self { data })
    }

    /// Write the overlay back.
    ///
    /// Durable keys missing from the overlay are removed, except reserved
    /// ones; every overlay key replaces its durable value.
    pub fn deploy(self, store: &mut DurableStore) -> Result<()> {
        for key in store.all_keys()? {
            if !is_reserved_key(&key) && !self.data.contains_key(&key) {
                store.remove_item(&key)?;
            }
        }
        for (key, value) in self.data {
            store.insert_item(&key, value)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ResourceStore for Overlay {
    fn get_item(&self, key: &str) -> Result<Option<Resource>> {
        Ok(self.data.get(key).cloned())
    }

    fn insert_item(&mut self, key: &str, value: Resource) -> Result<()> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    fn has_item(&self, key: &str) -> Result<bool> {
        Ok(self.data.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.data.keys().cloned().collect())
    }
}
