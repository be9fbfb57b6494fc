//! Rebase-style synchronization with the remote peer.
//!
//! A sync round sends the whole journal, receives a correction script and
//! replays, as one batch:
//!
//! 1. the `down` of every sent entry, newest first,
//! 2. the peer's `reverse` then `forward` operations,
//! 3. the `up` of every entry committed while the request was in flight.
//!
//! The sent entries are then gone from the journal and the cursor moves to
//! the peer's `syncPoint`. A failed request changes nothing locally.

pub mod transport;

pub use transport::{basic_auth, HttpTransport, Transport, TransportRequest};

use crate::command::{Failure, Method, Operation};
use crate::config::EndpointConfig;
use crate::device::{BatchReport, Device};
use crate::error::{Error, Result};
use crate::journal::JournalEntry;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;

const SENTINEL: &str = "||";

/// A journal entry as it goes on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionRecord {
    pub up: Operation,
    pub down: Operation,
    pub index: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub targets: Vec<String>,
    pub sync_point: Number,
    pub commit: Vec<TransmissionRecord>,
}

/// The peer's correction script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReply {
    pub sync_point: Number,
    #[serde(default)]
    pub reverse: Vec<Operation>,
    #[serde(default)]
    pub forward: Vec<Operation>,
}

/// Result of a completed sync round.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Report of the replay batch.
    pub report: BatchReport,
    /// The script that was replayed.
    pub script: Vec<Operation>,
    /// The peer's answer as received.
    pub response: Value,
}

impl SyncOutcome {
    pub fn errors(&self) -> &[Failure] {
        &self.report.errors
    }
}

fn wrap(value: &str, ids: &[String]) -> Option<String> {
    if value.starts_with(SENTINEL) {
        return None;
    }
    ids.iter().find_map(|id| {
        let rest = value.strip_prefix(id.as_str())?;
        (rest.is_empty() || rest.starts_with('/'))
            .then(|| format!("{SENTINEL}{id}{SENTINEL}{rest}"))
    })
}

/// Wrap every `href`/`resource` string naming one of `ids` (or a path below
/// one) in `||` sentinels, at any depth.
pub fn decorate(value: &mut Value, ids: &[String]) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                match field {
                    Value::String(s) if key == "href" || key == "resource" => {
                        if let Some(wrapped) = wrap(s, ids) {
                            *s = wrapped;
                        }
                    }
                    other => decorate(other, ids),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                decorate(item, ids);
            }
        }
        _ => {}
    }
}

fn decorate_operation(operation: &mut Operation, ids: &[String]) {
    if let Some(wrapped) = wrap(&operation.resource, ids) {
        operation.resource = wrapped;
    }
    if let Some(payload) = operation.payload.as_mut() {
        decorate(payload, ids);
    }
    for value in operation.meta.values_mut() {
        decorate(value, ids);
    }
}

/// Build the `commit` list for `log`.
///
/// Identifiers assigned by a journaled POST count as local from that entry
/// on, so references in the same and all later entries are decorated.
pub fn transmission_records(log: &[JournalEntry]) -> Vec<TransmissionRecord> {
    let mut local_ids: Vec<String> = Vec::new();
    log.iter()
        .map(|entry| {
            let mut up = entry.up.clone();
            let mut down = entry.down.clone();
            if up.method == Method::Post {
                if let Some(href) = up
                    .payload
                    .as_ref()
                    .and_then(|payload| payload.pointer("/_links/self/href"))
                    .and_then(Value::as_str)
                {
                    local_ids.push(href.to_string());
                }
            }
            decorate_operation(&mut up, &local_ids);
            decorate_operation(&mut down, &local_ids);
            TransmissionRecord {
                up,
                down,
                index: entry.index,
                timestamp: entry.timestamp,
            }
        })
        .collect()
}

/// The batch a sync round replays.
pub fn replay_script(
    sent: &[JournalEntry],
    reply: &SyncReply,
    raced: &[JournalEntry],
) -> Vec<Operation> {
    sent.iter()
        .rev()
        .map(|entry| entry.down.clone())
        .chain(reply.reverse.iter().cloned())
        .chain(reply.forward.iter().cloned())
        .chain(raced.iter().map(|entry| entry.up.clone()))
        .collect()
}

type RequestHook = Arc<dyn Fn() + Send + Sync>;

/// Callbacks around every request to the peer.
#[derive(Clone, Default)]
pub struct RequestHooks {
    on_start: Option<RequestHook>,
    on_complete: Option<RequestHook>,
}

impl RequestHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    /// Fires after the request settles, whether it succeeded or not.
    pub fn on_complete(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for RequestHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Syncs one device with one remote peer.
pub struct SyncEndpoint {
    device: Arc<Device>,
    transport: Arc<dyn Transport>,
    config: EndpointConfig,
    hooks: RequestHooks,
}

impl SyncEndpoint {
    pub fn new(device: Arc<Device>, transport: Arc<dyn Transport>, config: EndpointConfig) -> Self {
        Self {
            device,
            transport,
            config,
            hooks: RequestHooks::default(),
        }
    }

    /// An endpoint talking HTTP.
    pub fn http(device: Arc<Device>, config: EndpointConfig) -> Self {
        Self::new(device, Arc::new(HttpTransport::new()), config)
    }

    pub fn with_hooks(mut self, hooks: RequestHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Whether the device has a sync request outstanding. The slot is shared
    /// by every endpoint over the same device.
    pub fn is_in_flight(&self) -> bool {
        self.device.is_syncing()
    }

    async fn request(&self, method: Method, url: String, body: Option<Value>) -> Result<Value> {
        if let Some(hook) = &self.hooks.on_start {
            hook();
        }
        let result = self
            .transport
            .send(TransportRequest {
                method,
                url,
                authorization: basic_auth(&self.config.client_key, &self.config.client_secret),
                body,
            })
            .await;
        if let Some(hook) = &self.hooks.on_complete {
            hook();
        }
        result
    }

    /// Run one sync round for `targets`.
    ///
    /// `on_progress` sees the replay batch. Any error before the replay
    /// starts leaves the journal and the cursor untouched.
    pub async fn sync<F>(&self, targets: Vec<String>, on_progress: F) -> Result<SyncOutcome>
    where
        F: FnMut(usize, usize) + Send,
    {
        let _in_flight = self.device.try_begin_sync()?;

        let log = self.device.log()?;
        let size = log.len();
        let request = SyncRequest {
            targets,
            sync_point: self.device.sync_point()?,
            commit: transmission_records(&log),
        };
        tracing::info!(
            entries = size,
            sync_point = %request.sync_point,
            url = %self.config.sync_url(),
            "sync started"
        );

        let body = serde_json::to_value(&request)?;
        let response = self
            .request(Method::Post, self.config.sync_url(), Some(body))
            .await
            .inspect_err(|err| tracing::warn!(error = %err, "sync request failed"))?;
        let reply: SyncReply = serde_json::from_value(response.clone())
            .map_err(|err| Error::Protocol(format!("malformed sync reply: {err}")))?;

        let guard = self.device.try_acquire()?;
        let mut current = self.device.log()?;
        let raced = current.split_off(size.min(current.len()));
        let sent = self.device.take_log(size)?;
        let script = replay_script(&sent, &reply, &raced);
        tracing::debug!(
            unwound = sent.len(),
            reverse = reply.reverse.len(),
            forward = reply.forward.len(),
            raced = raced.len(),
            "replay script built"
        );

        let report = self
            .device
            .run_batch(&guard, script.clone(), on_progress)
            .await?;
        self.device.set_sync_point(&reply.sync_point)?;
        drop(guard);

        tracing::info!(
            sync_point = %reply.sync_point,
            replayed = report.total,
            failed = report.errors.len(),
            "sync finished"
        );
        Ok(SyncOutcome {
            report,
            script,
            response,
        })
    }

    /// Ask the peer for its cursor. Local state is not touched.
    ///
    /// The peer may answer with a bare number or `{"syncPoint": n}`.
    pub async fn fetch_sync_point(&self) -> Result<Number> {
        let _in_flight = self.device.try_begin_sync()?;
        let response = self
            .request(Method::Get, self.config.sync_point_url(), None)
            .await?;
        match response {
            Value::Number(n) => Ok(n),
            Value::Object(ref map) => match map.get("syncPoint") {
                Some(Value::Number(n)) => Ok(n.clone()),
                _ => Err(Error::Protocol(format!("no syncPoint in {response}"))),
            },
            other => Err(Error::Protocol(format!("unexpected sync point {other}"))),
        }
    }
}

impl fmt::Debug for SyncEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEndpoint")
            .field("url", &self.config.url)
            .field("sync_suffix", &self.config.sync_suffix)
            .field("in_flight", &self.is_in_flight())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
