//! Command implementations. Each returns the JSON document to print.

use crate::config::Config;
use crate::error::{CliError, Result};
use dovetail_engine::{
    Device, DeviceConfig, DirBackend, EndpointConfig, LinkOptions, Response, SyncEndpoint,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Open the directory-backed device described by `config`.
pub fn open_device(config: &Config) -> Result<Device> {
    let backend = DirBackend::open(&config.path)?;
    let mut device_config = DeviceConfig::default().with_interval(config.interval);
    if let Some(namespace) = &config.namespace {
        device_config = device_config.with_namespace(namespace.clone());
    }
    tracing::debug!(path = %config.path.display(), namespace = ?config.namespace, "store opened");
    Ok(Device::new(Arc::new(backend), device_config))
}

fn parse(json: &str) -> Result<Value> {
    Ok(serde_json::from_str(json)?)
}

fn finish(response: Response) -> Result<Value> {
    match response {
        Response::Error(failure) => Err(CliError::Failed(Box::new(failure))),
        success => Ok(serde_json::to_value(success)?),
    }
}

pub fn post(
    device: &Device,
    resource_type: &str,
    json: &str,
    collection: Option<String>,
    parent: Option<String>,
) -> Result<Value> {
    let links = LinkOptions {
        collection,
        parent,
    };
    finish(device.post(resource_type, parse(json)?, &links))
}

pub fn put(device: &Device, id: &str, json: &str) -> Result<Value> {
    finish(device.put(id, parse(json)?, &LinkOptions::new()))
}

pub fn patch(device: &Device, id: &str, json: &str) -> Result<Value> {
    finish(device.patch(id, parse(json)?))
}

pub fn delete(device: &Device, id: &str) -> Result<Value> {
    finish(device.delete(id))
}

pub fn get(device: &Device, key: &str) -> Result<Value> {
    Ok(device
        .get_item(key)?
        .map(|item| item.into_value())
        .unwrap_or(Value::Null))
}

pub fn log(device: &Device) -> Result<Value> {
    Ok(serde_json::to_value(device.log()?)?)
}

pub fn sync_point(device: &Device) -> Result<Value> {
    Ok(Value::Number(device.sync_point()?))
}

pub async fn sync(device: Device, endpoint: EndpointConfig, targets: Vec<String>) -> Result<Value> {
    let endpoint = SyncEndpoint::http(Arc::new(device), endpoint);
    let outcome = endpoint
        .sync(targets, |done, total| {
            tracing::debug!(done, total, "replaying");
        })
        .await?;
    Ok(json!({
        "syncPoint": endpoint.device().sync_point()?,
        "replayed": outcome.report.total,
        "errors": outcome.report.errors,
    }))
}
