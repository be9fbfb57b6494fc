//! Hypermedia resource documents.
//!
//! A resource is a JSON object with two reserved fields: `_links`, mapping a
//! relation name to a single `{href}` or an ordered list of them, and
//! `_embedded`, a denormalized copy of linked resources that is always
//! derived from `_links` and never written by callers.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Field holding the link relations of a resource.
pub const LINKS: &str = "_links";
/// Field holding the materialized copies of linked resources.
pub const EMBEDDED: &str = "_embedded";
/// Relation pointing at the resource's own storage key.
pub const SELF_REL: &str = "self";
/// Relation naming the collection a resource belongs to.
pub const COLLECTION_REL: &str = "_collection";
/// Relation naming the resource that embeds this one.
pub const PARENT_REL: &str = "_parent";
/// Payload field reserved for client-local bookkeeping; never journaled.
pub const LOCAL_FIELD: &str = "_local";
/// PATCH payload field listing the fields to drop.
pub const REMOVE_FIELD: &str = "_remove";

/// Returns true for storage keys reserved for internal bookkeeping.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with('_')
}

/// Resource type of an identifier: `"posts/3"` is a `"posts"`.
///
/// An identifier without an id segment is its own type.
pub fn resource_type(href: &str) -> &str {
    match href.rfind('/') {
        Some(pos) => &href[..pos],
        None => href,
    }
}

/// A JSON document stored under a key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Map<String, Value>);

impl Resource {
    /// Create an empty resource.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Convert a JSON value into a resource; only objects qualify.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidPayload(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// The default shape of a lazily created collection.
    pub fn collection(key: &str) -> Self {
        let mut links = Map::new();
        links.insert(SELF_REL.to_string(), json!({ "href": key }));
        links.insert(key.to_string(), Value::Array(Vec::new()));

        let mut fields = Map::new();
        fields.insert(LINKS.to_string(), Value::Object(links));
        fields.insert("count".to_string(), json!(0));
        Self(fields)
    }

    /// Unwrap into the underlying JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Borrow the fields as a JSON map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Read a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Whether `field` is present, even if null.
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Set a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Drop a field, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Iterate over all fields, reserved ones included.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The `href` of a singular relation.
    pub fn link(&self, rel: &str) -> Option<&str> {
        self.0
            .get(LINKS)?
            .get(rel)?
            .get("href")
            .and_then(Value::as_str)
    }

    /// The `self` link: this resource's own id.
    pub fn self_href(&self) -> Option<&str> {
        self.link(SELF_REL)
    }

    /// The collection this resource belongs to.
    pub fn collection_href(&self) -> Option<&str> {
        self.link(COLLECTION_REL)
    }

    /// The resource that embeds this one.
    pub fn parent_href(&self) -> Option<&str> {
        self.link(PARENT_REL)
    }

    /// Set a singular relation, creating `_links` if needed.
    pub fn set_link(&mut self, rel: &str, href: &str) {
        self.links_mut()
            .insert(rel.to_string(), json!({ "href": href }));
    }

    /// Point the `self` link at `href`.
    pub fn set_self_href(&mut self, href: &str) {
        self.set_link(SELF_REL, href);
    }

    /// Remove a relation of either arity.
    pub fn remove_link(&mut self, rel: &str) -> Option<Value> {
        self.0
            .get_mut(LINKS)
            .and_then(Value::as_object_mut)
            .and_then(|links| links.remove(rel))
    }

    /// Mutable access to `_links`, replacing a malformed value with `{}`.
    pub fn links_mut(&mut self) -> &mut Map<String, Value> {
        let links = self
            .0
            .entry(LINKS)
            .or_insert_with(|| Value::Object(Map::new()));
        if !links.is_object() {
            *links = Value::Object(Map::new());
        }
        match links {
            Value::Object(map) => map,
            _ => unreachable!("_links was just normalized to an object"),
        }
    }

    /// Relation names with their link values, `self` included.
    pub fn relations(&self) -> Vec<(String, Value)> {
        self.0
            .get(LINKS)
            .and_then(Value::as_object)
            .map(|links| {
                links
                    .iter()
                    .map(|(rel, value)| (rel.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The hrefs of a plural relation, in order.
    pub fn members(&self, rel: &str) -> Vec<String> {
        self.0
            .get(LINKS)
            .and_then(|links| links.get(rel))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("href").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Member list of a plural relation, created empty when absent.
    pub fn members_mut(&mut self, rel: &str) -> &mut Vec<Value> {
        let slot = self
            .links_mut()
            .entry(rel.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => items,
            _ => unreachable!("relation was just normalized to an array"),
        }
    }

    /// Membership counter of a collection, if it keeps one.
    pub fn count(&self) -> Option<i64> {
        self.0.get("count").and_then(Value::as_i64)
    }

    pub(crate) fn adjust_count(&mut self, delta: i64) {
        if let Some(count) = self.count() {
            self.0.insert("count".to_string(), json!(count + delta));
        }
    }

    /// The materialized copy under `_embedded.<rel>`.
    pub fn embedded(&self, rel: &str) -> Option<&Value> {
        self.0.get(EMBEDDED)?.get(rel)
    }

    /// Store a materialized copy under `_embedded.<rel>`.
    pub fn set_embedded(&mut self, rel: &str, value: Value) {
        let embedded = self
            .0
            .entry(EMBEDDED)
            .or_insert_with(|| Value::Object(Map::new()));
        if !embedded.is_object() {
            *embedded = Value::Object(Map::new());
        }
        if let Value::Object(map) = embedded {
            map.insert(rel.to_string(), value);
        }
    }

    /// Drop `_embedded.<rel>`, and `_embedded` itself once empty.
    pub fn remove_embedded(&mut self, rel: &str) {
        let now_empty = match self.0.get_mut(EMBEDDED).and_then(Value::as_object_mut) {
            Some(map) => {
                map.remove(rel);
                map.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.0.remove(EMBEDDED);
        }
    }

    /// Drop the whole materialized view.
    pub fn clear_embedded(&mut self) {
        self.0.remove(EMBEDDED);
    }

    /// A copy fit for embedding elsewhere: everything but `_embedded`.
    pub fn embeddable(&self) -> Value {
        let fields = self
            .0
            .iter()
            .filter(|(field, _)| field.as_str() != EMBEDDED)
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        Value::Object(fields)
    }
}

impl From<Map<String, Value>> for Resource {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Resource> for Value {
    fn from(resource: Resource) -> Self {
        resource.into_value()
    }
}

impl TryFrom<Value> for Resource {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Resource::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_of_identifier() {
        assert_eq!(resource_type("posts/3"), "posts");
        assert_eq!(resource_type("posts"), "posts");
        assert_eq!(resource_type("users/1/posts/3"), "users/1/posts");
    }

    #[test]
    fn reserved_keys() {
        assert!(is_reserved_key("_log"));
        assert!(is_reserved_key("_syncPoint"));
        assert!(!is_reserved_key("posts/1"));
    }

    #[test]
    fn links_roundtrip() {
        let mut post = Resource::from_value(json!({"title": "Hello"})).unwrap();
        assert_eq!(post.self_href(), None);

        post.set_self_href("posts/1");
        post.set_link(COLLECTION_REL, "blogs/1");
        assert_eq!(post.self_href(), Some("posts/1"));
        assert_eq!(post.collection_href(), Some("blogs/1"));

        post.remove_link(COLLECTION_REL);
        assert_eq!(post.collection_href(), None);
    }

    #[test]
    fn non_object_rejected() {
        let result = Resource::from_value(json!([1, 2, 3]));
        assert!(matches!(result, Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn default_collection_shape() {
        let collection = Resource::collection("posts");
        assert_eq!(collection.self_href(), Some("posts"));
        assert_eq!(collection.count(), Some(0));
        assert!(collection.members("posts").is_empty());
    }

    #[test]
    fn members_and_embedding() {
        let mut collection = Resource::collection("posts");
        collection.members_mut("posts").push(json!({"href": "posts/1"}));
        collection.members_mut("posts").push(json!({"href": "posts/2"}));
        assert_eq!(collection.members("posts"), vec!["posts/1", "posts/2"]);

        collection.set_embedded("posts", json!([]));
        assert!(collection.embedded("posts").is_some());
        assert!(collection.embeddable().get(EMBEDDED).is_none());

        collection.remove_embedded("posts");
        assert!(collection.get(EMBEDDED).is_none());
    }

    #[test]
    fn malformed_links_are_normalized() {
        let mut item = Resource::from_value(json!({"_links": "oops"})).unwrap();
        item.set_self_href("notes/1");
        assert_eq!(item.self_href(), Some("notes/1"));
    }
}
