//! The command journal.
//!
//! Committed commands are appended to the reserved `_log` key in commit
//! order. `_logHead` records the highest index ever handed out, so indices
//! keep increasing after the front of the log has been taken by a sync
//! round. The sync cursor lives next to them under `_syncPoint`.

use crate::command::{Command, Operation};
use crate::error::Result;
use crate::resource::LOCAL_FIELD;
use crate::store::DurableStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

pub const LOG_KEY: &str = "_log";
pub const LOG_HEAD_KEY: &str = "_logHead";
pub const SYNC_POINT_KEY: &str = "_syncPoint";

/// Response fields that never reach the journal.
const TRANSPORT_FIELDS: [&str; 2] = ["data", "status"];

/// One committed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// 1-based, strictly increasing.
    pub index: u64,
    /// Seconds since the epoch at commit time.
    pub timestamp: i64,
    pub up: Operation,
    pub down: Operation,
    /// Caller metadata carried over from the issued operation.
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl JournalEntry {
    pub fn command(&self) -> Command {
        Command::new(self.up.clone(), self.down.clone())
    }
}

/// Journal view over a durable store.
///
/// Mutating calls read-modify-write the whole log; the device serializes
/// them behind its store lock.
#[derive(Debug, Clone, Copy)]
pub struct Journal<'a> {
    store: &'a DurableStore,
}

impl<'a> Journal<'a> {
    pub fn new(store: &'a DurableStore) -> Self {
        Self { store }
    }

    /// The full log, oldest first.
    pub fn log(&self) -> Result<Vec<JournalEntry>> {
        Ok(self.store.get_value(LOG_KEY)?.unwrap_or_default())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.log()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Append `command` and return the stored entry.
    pub fn push(&self, command: &Command) -> Result<JournalEntry> {
        let mut up = command.up.clone();
        let mut meta = std::mem::take(&mut up.meta);
        for field in TRANSPORT_FIELDS {
            meta.remove(field);
        }
        if let Some(Value::Object(payload)) = up.payload.as_mut() {
            payload.remove(LOCAL_FIELD);
        }

        let mut log = self.log()?;
        let last = log.last().map(|entry| entry.index).unwrap_or(0);
        let head: u64 = self.store.get_value(LOG_HEAD_KEY)?.unwrap_or(0);
        let index = head.max(last) + 1;

        let entry = JournalEntry {
            index,
            timestamp: Utc::now().timestamp(),
            up,
            down: command.down.clone(),
            meta,
        };
        log.push(entry.clone());
        self.store.insert_value(LOG_KEY, &log)?;
        self.store.insert_value(LOG_HEAD_KEY, &index)?;

        tracing::debug!(index, path = %entry.up.route_path(), "command journaled");
        Ok(entry)
    }

    /// Remove and return the first `n` entries.
    pub fn take(&self, n: usize) -> Result<Vec<JournalEntry>> {
        let mut log = self.log()?;
        let n = n.min(log.len());
        let taken: Vec<JournalEntry> = log.drain(..n).collect();
        self.store.insert_value(LOG_KEY, &log)?;
        Ok(taken)
    }

    /// The sync cursor, `0` before the first sync.
    pub fn sync_point(&self) -> Result<Number> {
        Ok(self
            .store
            .get_value(SYNC_POINT_KEY)?
            .unwrap_or_else(|| Number::from(0)))
    }

    pub fn set_sync_point(&self, sync_point: &Number) -> Result<()> {
        self.store.insert_value(SYNC_POINT_KEY, sync_point)
    }
}
