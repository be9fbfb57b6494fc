//! Default CRUD handlers.
//!
//! Each handler mutates the store it is given, keeps the link graph
//! consistent through [`links`](crate::links), and returns the data the
//! router needs to build the inverse command: the stored item for `POST`,
//! the removed item for `DELETE`, and the pre-image for `PATCH` and `PUT`.

use crate::command::Operation;
use crate::error::{Error, Result};
use crate::links;
use crate::resource::{Resource, EMBEDDED, REMOVE_FIELD};
use crate::router::Params;
use crate::store::ResourceStore;
use serde_json::{Map, Value};

fn payload_of(operation: &Operation) -> Result<Resource> {
    let mut payload = match &operation.payload {
        Some(value) => Resource::from_value(value.clone())?,
        None => Resource::new(),
    };
    payload.clear_embedded();
    Ok(payload)
}

fn item_key(params: &Params) -> Result<String> {
    Ok(format!("{}/{}", params.require("resource")?, params.require("id")?))
}

fn existing(store: &dyn ResourceStore, key: &str) -> Result<Resource> {
    store
        .get_item(key)?
        .ok_or_else(|| Error::MissingKey(key.to_string()))
}

/// `POST /:resource`: store the payload at its self href and attach it to
/// its collection, its parent and the resource-type collection.
pub fn post(
    store: &mut dyn ResourceStore,
    params: &Params,
    operation: &Operation,
) -> Result<Option<Value>> {
    let resource_type = params.require("resource")?;
    let payload = payload_of(operation)?;
    let key = payload
        .self_href()
        .ok_or_else(|| Error::InvalidPayload("POST payload has no self link".into()))?
        .to_string();

    store.insert_item(&key, payload.clone())?;
    links::on_insert(store, &key, &payload, resource_type)?;

    let stored = store.get_item(&key)?.unwrap_or(payload);
    Ok(Some(stored.into_value()))
}

/// `DELETE /:resource/:id`: remove the item and detach it everywhere.
/// Returns the removed item.
pub fn delete(
    store: &mut dyn ResourceStore,
    params: &Params,
    _operation: &Operation,
) -> Result<Option<Value>> {
    let resource_type = params.require("resource")?;
    let key = item_key(params)?;
    let item = existing(store, &key)?;

    store.remove_item(&key)?;
    links::on_remove(store, &key, &item, resource_type)?;

    Ok(Some(item.embeddable()))
}

/// `PATCH /:resource/:id`: assign the given fields and drop the ones named
/// in `_remove`.
///
/// Values are stored verbatim, `null` included. The returned pre-image holds
/// the previous value of every touched field that existed and lists the
/// touched fields that did not under `_remove`, so patching it back restores
/// the item exactly.
pub fn patch(
    store: &mut dyn ResourceStore,
    params: &Params,
    operation: &Operation,
) -> Result<Option<Value>> {
    let resource_type = params.require("resource")?;
    let key = item_key(params)?;
    let item = existing(store, &key)?;
    let mut changes = payload_of(operation)?;
    let removals = removals_of(&mut changes)?;

    let mut updated = item.clone();
    let mut restore = Map::new();
    let mut absent = Vec::new();
    let mut record = |field: &str| match item.get(field) {
        Some(prior) => {
            restore.insert(field.to_string(), prior.clone());
        }
        None => {
            if !absent.iter().any(|name: &Value| name == field) {
                absent.push(Value::String(field.to_string()));
            }
        }
    };

    for (field, value) in changes.fields() {
        record(field.as_str());
        updated.insert(field.clone(), value.clone());
    }
    for field in &removals {
        record(field.as_str());
        updated.remove(field);
    }
    if !absent.is_empty() {
        restore.insert(REMOVE_FIELD.to_string(), Value::Array(absent));
    }

    let self_href = item.self_href().unwrap_or(&key).to_string();
    updated.set_self_href(&self_href);

    store.insert_item(&key, updated.clone())?;
    links::on_update(store, &key, &item, &updated, resource_type)?;

    Ok(Some(Value::Object(restore)))
}

/// Take the `_remove` list out of a PATCH payload.
fn removals_of(changes: &mut Resource) -> Result<Vec<String>> {
    match changes.remove(REMOVE_FIELD) {
        None => Ok(Vec::new()),
        Some(Value::Array(names)) => names
            .into_iter()
            .map(|name| match name {
                Value::String(field) if field != EMBEDDED && field != REMOVE_FIELD => Ok(field),
                other => Err(Error::InvalidPayload(format!(
                    "cannot remove field {other}"
                ))),
            })
            .collect(),
        Some(other) => Err(Error::InvalidPayload(format!(
            "{REMOVE_FIELD} must be an array of field names, got {other}"
        ))),
    }
}

/// `PUT /:resource/:id`: replace the item wholesale, keeping its self href.
/// Returns the prior document.
pub fn put(
    store: &mut dyn ResourceStore,
    params: &Params,
    operation: &Operation,
) -> Result<Option<Value>> {
    let resource_type = params.require("resource")?;
    let key = item_key(params)?;
    let item = existing(store, &key)?;

    let mut replacement = payload_of(operation)?;
    let self_href = item.self_href().unwrap_or(&key).to_string();
    replacement.set_self_href(&self_href);

    store.insert_item(&key, replacement.clone())?;
    links::on_update(store, &key, &item, &replacement, resource_type)?;

    Ok(Some(item.embeddable()))
}
