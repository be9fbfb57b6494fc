//! Link-graph maintenance.
//!
//! `_links` is the only authoritative edge set; `_embedded` is a view
//! derived from it. Whenever an item is created, replaced, patched or
//! deleted, the resources its `_collection` and `_parent` links point at
//! are updated here, and their embedded copies recomputed.

use crate::error::Result;
use crate::resource::{Resource, COLLECTION_REL, PARENT_REL, SELF_REL};
use crate::store::ResourceStore;
use serde_json::Value;

/// Recompute `_embedded.<relation>` of the collection at `key` from its
/// member list.
pub fn embed_members(store: &mut dyn ResourceStore, key: &str, relation: &str) -> Result<()> {
    let Some(collection) = store.get_item(key)? else {
        return Ok(());
    };
    let mut copies = Vec::new();
    for href in collection.members(relation) {
        if let Some(member) = store.get_item(&href)? {
            copies.push(member.embeddable());
        }
    }
    store.update_collection_with(key, &mut |collection: &mut Resource| {
        collection.set_embedded(relation, Value::Array(copies.clone()));
    })
}

/// Make `href` a member of the collection at `key`.
pub fn attach_to_collection(
    store: &mut dyn ResourceStore,
    key: &str,
    href: &str,
    relation: &str,
) -> Result<()> {
    store.add_to_collection(key, href, Some(relation))?;
    embed_members(store, key, relation)
}

/// Drop `href` from the collection at `key`.
pub fn detach_from_collection(
    store: &mut dyn ResourceStore,
    key: &str,
    href: &str,
    relation: &str,
) -> Result<()> {
    store.remove_from_collection(key, href, Some(relation))?;
    embed_members(store, key, relation)
}

/// Link the parent at `key` to `href` under `relation` and embed a fresh
/// copy of the item.
pub fn attach_to_parent(
    store: &mut dyn ResourceStore,
    key: &str,
    href: &str,
    relation: &str,
) -> Result<()> {
    let copy = store.get_item(href)?.map(|item| item.embeddable());
    store.update_collection_with(key, &mut |parent: &mut Resource| {
        parent.set_link(relation, href);
        match &copy {
            Some(copy) => parent.set_embedded(relation, copy.clone()),
            None => parent.remove_embedded(relation),
        }
    })
}

/// Unlink the parent at `key` from `href`.
///
/// Nothing happens if the parent is gone or already points elsewhere.
pub fn detach_from_parent(
    store: &mut dyn ResourceStore,
    key: &str,
    href: &str,
    relation: &str,
) -> Result<()> {
    let Some(parent) = store.get_item(key)? else {
        return Ok(());
    };
    if parent.link(relation) != Some(href) {
        return Ok(());
    }
    store.update_collection_with(key, &mut |parent: &mut Resource| {
        parent.remove_link(relation);
        parent.remove_embedded(relation);
    })
}

/// Re-derive the `_embedded` view of the item at `key` from its own links.
///
/// Singular relations embed the linked resource, plural ones the list of
/// members that still exist. `self`, `_collection` and `_parent` are never
/// embedded.
pub fn materialize(store: &mut dyn ResourceStore, key: &str) -> Result<()> {
    let Some(mut item) = store.get_item(key)? else {
        return Ok(());
    };
    let before = item.get(crate::resource::EMBEDDED).cloned();
    item.clear_embedded();

    for (relation, target) in item.relations() {
        if matches!(relation.as_str(), SELF_REL | COLLECTION_REL | PARENT_REL) {
            continue;
        }
        match target {
            Value::Array(_) => {
                let mut copies = Vec::new();
                for href in item.members(&relation) {
                    if let Some(member) = store.get_item(&href)? {
                        copies.push(member.embeddable());
                    }
                }
                item.set_embedded(&relation, Value::Array(copies));
            }
            Value::Object(ref link) => {
                let Some(href) = link.get("href").and_then(Value::as_str) else {
                    continue;
                };
                if href == key {
                    continue;
                }
                if let Some(linked) = store.get_item(href)? {
                    item.set_embedded(&relation, linked.embeddable());
                }
            }
            _ => {}
        }
    }

    if item.get(crate::resource::EMBEDDED) != before.as_ref() {
        store.insert_item(key, item)?;
    }
    Ok(())
}

/// Wire a freshly inserted item into the graph.
pub fn on_insert(
    store: &mut dyn ResourceStore,
    key: &str,
    item: &Resource,
    resource_type: &str,
) -> Result<()> {
    if let Some(target) = item.collection_href() {
        attach_to_collection(store, target, key, resource_type)?;
    }
    if let Some(target) = item.parent_href() {
        attach_to_parent(store, target, key, resource_type)?;
    }
    store.add_to_collection(resource_type, key, None)?;
    materialize(store, key)
}

/// Unwire a removed item from the graph.
pub fn on_remove(
    store: &mut dyn ResourceStore,
    key: &str,
    item: &Resource,
    resource_type: &str,
) -> Result<()> {
    if let Some(target) = item.collection_href() {
        detach_from_collection(store, target, key, resource_type)?;
    }
    if let Some(target) = item.parent_href() {
        detach_from_parent(store, target, key, resource_type)?;
    }
    store.remove_from_collection(resource_type, key, None)
}

/// Rebind an updated item: changed targets are detached and re-attached,
/// unchanged ones get a fresh embedded copy.
pub fn on_update(
    store: &mut dyn ResourceStore,
    key: &str,
    old: &Resource,
    new: &Resource,
    resource_type: &str,
) -> Result<()> {
    let (old_collection, new_collection) = (old.collection_href(), new.collection_href());
    if old_collection != new_collection {
        if let Some(target) = old_collection {
            detach_from_collection(store, target, key, resource_type)?;
        }
        if let Some(target) = new_collection {
            attach_to_collection(store, target, key, resource_type)?;
        }
    } else if let Some(target) = new_collection {
        embed_members(store, target, resource_type)?;
    }

    let (old_parent, new_parent) = (old.parent_href(), new.parent_href());
    if old_parent != new_parent {
        if let Some(target) = old_parent {
            detach_from_parent(store, target, key, resource_type)?;
        }
        if let Some(target) = new_parent {
            attach_to_parent(store, target, key, resource_type)?;
        }
    } else if let Some(target) = new_parent {
        attach_to_parent(store, target, key, resource_type)?;
    }

    materialize(store, key)
}
