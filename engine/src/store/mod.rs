//! Resource stores.
//!
//! [`ResourceStore`] is the contract the router and default handlers work
//! against. Two implementations exist: [`DurableStore`], which persists
//! through a [`KeyValueBackend`], and [`Overlay`], the in-memory snapshot a
//! batch runs in.

pub mod backend;
pub mod durable;
pub mod overlay;

pub use backend::{DirBackend, KeyValueBackend, MemoryBackend};
pub use durable::DurableStore;
pub use overlay::Overlay;

use crate::error::Result;
use crate::resource::Resource;
use serde_json::json;

/// Key/value CRUD over resources plus collection bookkeeping.
pub trait ResourceStore {
    fn get_item(&self, key: &str) -> Result<Option<Resource>>;

    fn insert_item(&mut self, key: &str, value: Resource) -> Result<()>;

    fn remove_item(&mut self, key: &str) -> Result<()>;

    fn has_item(&self, key: &str) -> Result<bool>;

    /// All application keys; reserved keys are never listed.
    fn keys(&self) -> Result<Vec<String>>;

    /// Smallest `resource_type/n` not currently in use.
    ///
    /// Not safe against two concurrent allocators; callers rely on the
    /// device's single-flight guard.
    fn first_available_key(&self, resource_type: &str) -> Result<String> {
        let mut n: u64 = 1;
        loop {
            let key = format!("{resource_type}/{n}");
            if !self.has_item(&key)? {
                return Ok(key);
            }
            n += 1;
        }
    }

    /// Read-or-create the collection at `key`, mutate it, persist it.
    ///
    /// This is the only write path for collections.
    fn update_collection_with(
        &mut self,
        key: &str,
        update: &mut dyn FnMut(&mut Resource),
    ) -> Result<()> {
        let mut collection = match self.get_item(key)? {
            Some(existing) => existing,
            None => Resource::collection(key),
        };
        update(&mut collection);
        self.insert_item(key, collection)
    }

    /// Add `href` to the `relation` list of the collection at `key`.
    ///
    /// The relation defaults to the collection key. Adding a present member
    /// is a no-op.
    fn add_to_collection(&mut self, key: &str, href: &str, relation: Option<&str>) -> Result<()> {
        let relation = relation.unwrap_or(key).to_string();
        self.update_collection_with(key, &mut |collection: &mut Resource| {
            let members = collection.members_mut(&relation);
            if members
                .iter()
                .any(|member| member.get("href").and_then(|h| h.as_str()) == Some(href))
            {
                return;
            }
            members.push(json!({ "href": href }));
            collection.adjust_count(1);
        })
    }

    /// Remove `href` from the `relation` list; removing an absent member, or
    /// from an absent collection, is a no-op.
    fn remove_from_collection(
        &mut self,
        key: &str,
        href: &str,
        relation: Option<&str>,
    ) -> Result<()> {
        if !self.has_item(key)? {
            return Ok(());
        }
        let relation = relation.unwrap_or(key).to_string();
        self.update_collection_with(key, &mut |collection: &mut Resource| {
            let members = collection.members_mut(&relation);
            let before = members.len();
            members.retain(|member| member.get("href").and_then(|h| h.as_str()) != Some(href));
            let removed = (before - members.len()) as i64;
            if removed > 0 {
                collection.adjust_count(-removed);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay() -> Overlay {
        Overlay::empty()
    }

    #[test]
    fn first_available_key_counts_from_one() {
        let mut store = overlay();
        assert_eq!(store.first_available_key("posts").unwrap(), "posts/1");

        store.insert_item("posts/1", Resource::new()).unwrap();
        store.insert_item("posts/3", Resource::new()).unwrap();
        assert_eq!(store.first_available_key("posts").unwrap(), "posts/2");

        store.insert_item("posts/2", Resource::new()).unwrap();
        assert_eq!(store.first_available_key("posts").unwrap(), "posts/4");
    }

    #[test]
    fn collection_created_lazily() {
        let mut store = overlay();
        store.add_to_collection("posts", "posts/1", None).unwrap();

        let collection = store.get_item("posts").unwrap().unwrap();
        assert_eq!(collection.self_href(), Some("posts"));
        assert_eq!(collection.count(), Some(1));
        assert_eq!(collection.members("posts"), vec!["posts/1"]);
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let mut store = overlay();
        store.add_to_collection("posts", "posts/1", None).unwrap();
        store.add_to_collection("posts", "posts/1", None).unwrap();
        store.add_to_collection("posts", "posts/2", None).unwrap();
        assert_eq!(store.get_item("posts").unwrap().unwrap().count(), Some(2));

        store.remove_from_collection("posts", "posts/1", None).unwrap();
        store.remove_from_collection("posts", "posts/1", None).unwrap();
        store.remove_from_collection("posts", "posts/9", None).unwrap();

        let collection = store.get_item("posts").unwrap().unwrap();
        assert_eq!(collection.count(), Some(1));
        assert_eq!(collection.members("posts"), vec!["posts/2"]);
    }

    #[test]
    fn named_relation() {
        let mut store = overlay();
        store
            .add_to_collection("posts/1", "comments/1", Some("comments"))
            .unwrap();

        let post = store.get_item("posts/1").unwrap().unwrap();
        assert_eq!(post.members("comments"), vec!["comments/1"]);
        assert!(post.members("posts/1").is_empty());
    }
}
