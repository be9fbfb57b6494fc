//! # Dovetail Engine
//!
//! An offline-first store for hypermedia-linked JSON resources.
//!
//! Clients mutate the local resource graph while disconnected. Every
//! committed mutation is journaled as a reversible command, and a sync round
//! later rebases that local history onto the authoritative peer's
//! correction script.
//!
//! ## Core Concepts
//!
//! ### Resources
//!
//! A [`Resource`] is a JSON object with two reserved fields:
//! - `_links`: relation to `{href}` or an ordered `[{href}]` list
//! - `_embedded`: denormalized copies derived from `_links`, never authoritative
//!
//! Items are keyed `type/n`; collections carry `count` and a member list.
//!
//! ### Commands
//!
//! The [`Router`] turns every successful mutation into a [`Command`]: the
//! operation as issued (`up`) and its inverse (`down`):
//! - `POST` is undone by `DELETE` of the new id
//! - `DELETE` is undone by `POST` of the deleted item
//! - `PUT` and `PATCH` are undone by the same method with the pre-image
//!
//! ### Batches
//!
//! [`Device::batch_run`] applies a list of operations in order inside an
//! [`Overlay`] snapshot and deploys it at the end. Failures are reported,
//! not rolled back. Only one batch or sync runs at a time; anything else
//! gets `DEVICE_BUSY`.
//!
//! ### Sync
//!
//! [`SyncEndpoint::sync`] sends the journal, unwinds it, replays the peer's
//! `reverse` and `forward` scripts, then replays local commands that raced
//! the round trip.
//!
//! ## Quick Start
//!
//! ```rust
//! use dovetail_engine::{Device, DeviceConfig, LinkOptions, MemoryBackend};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let device = Device::new(Arc::new(MemoryBackend::new()), DeviceConfig::default());
//!
//! let response = device.post("posts", json!({"title": "Hello"}), &LinkOptions::new());
//! assert_eq!(response.id(), Some("posts/1"));
//!
//! let comment = device.post(
//!     "comments",
//!     json!({"body": "First!"}),
//!     &LinkOptions::new().collection("posts/1"),
//! );
//! assert!(comment.is_success());
//!
//! let post = device.get_item("posts/1").unwrap().unwrap();
//! assert_eq!(post.members("comments"), vec!["comments/1"]);
//! assert_eq!(device.log().unwrap().len(), 2);
//! ```

pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod handlers;
pub mod journal;
pub mod links;
pub mod resource;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod sync;

// Re-export main types at crate root
pub use command::{Command, Failure, Method, Operation, Response, Success};
pub use config::{ConfigError, DeviceConfig, EndpointConfig};
pub use device::{BatchHooks, BatchReport, Device, LinkOptions};
pub use error::{Error, ErrorKind, Result};
pub use journal::{Journal, JournalEntry};
pub use resource::Resource;
pub use router::{Handler, Params, RouteTemplate, Router};
pub use scheduler::{ImmediateScheduler, Scheduler, TokioScheduler};
pub use store::{DirBackend, DurableStore, KeyValueBackend, MemoryBackend, Overlay, ResourceStore};
pub use sync::{
    HttpTransport, RequestHooks, SyncEndpoint, SyncOutcome, SyncReply, SyncRequest, Transport,
    TransportRequest,
};
