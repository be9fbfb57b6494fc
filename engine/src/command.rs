//! Operation, command and response envelopes.
//!
//! Changes are expressed as operations. A committed operation becomes a
//! [`Command`]: the operation as issued (`up`) paired with its inverse
//! (`down`).

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Request methods understood by the router.
///
/// Only the mutating methods can be committed; `GET` exists so callers can
/// register read routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// The HTTP verb as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Whether operations with this method can be journaled.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(Error::MethodNotSupported(s.to_string())),
        }
    }
}

/// The operation envelope: `{method, resource, payload?}`.
///
/// Any other top-level field is caller metadata; it travels with the
/// operation and ends up on the journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub method: Method,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl Operation {
    /// An operation with no metadata.
    pub fn new(method: Method, resource: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            method,
            resource: resource.into(),
            payload,
            meta: Map::new(),
        }
    }

    /// Create a resource of type `resource`.
    pub fn post(resource: impl Into<String>, payload: Value) -> Self {
        Self::new(Method::Post, resource, Some(payload))
    }

    /// Replace the resource at `resource`.
    pub fn put(resource: impl Into<String>, payload: Value) -> Self {
        Self::new(Method::Put, resource, Some(payload))
    }

    /// Assign fields on the resource at `resource`.
    pub fn patch(resource: impl Into<String>, payload: Value) -> Self {
        Self::new(Method::Patch, resource, Some(payload))
    }

    /// Remove the resource at `resource`.
    pub fn delete(resource: impl Into<String>) -> Self {
        Self::new(Method::Delete, resource, None)
    }

    /// Read the resource at `resource`.
    pub fn get(resource: impl Into<String>) -> Self {
        Self::new(Method::Get, resource, None)
    }

    /// Attach a caller metadata field.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// The `METHOD/resource` path routes are matched against.
    pub fn route_path(&self) -> String {
        format!("{}/{}", self.method, self.resource)
    }
}

/// A committed mutation and its inverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub up: Operation,
    pub down: Operation,
}

impl Command {
    /// Pair an operation with its inverse.
    pub fn new(up: Operation, down: Operation) -> Self {
        Self { up, down }
    }

    /// The same pair seen from the other side.
    pub fn inverted(&self) -> Self {
        Self {
            up: self.down.clone(),
            down: self.up.clone(),
        }
    }
}

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Success {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    /// Identifier assigned by a POST.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Body of an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(rename = "_error")]
    pub error: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Operation>,
}

impl Failure {
    /// An envelope carrying only the error kind.
    pub fn new(error: ErrorKind) -> Self {
        Self {
            error,
            resource: None,
            description: None,
            request: None,
        }
    }

    /// Build the envelope for `err`, recording the request that caused it.
    pub fn from_error(err: &Error, request: Option<&Operation>) -> Self {
        Self {
            error: err.kind(),
            resource: err.resource().map(str::to_string),
            description: Some(err.to_string()),
            request: request.cloned(),
        }
    }
}

/// The response envelope, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success(Success),
    Error(Failure),
}

impl Response {
    /// A success without a journaled command.
    pub fn success(data: Value) -> Self {
        Response::Success(Success {
            data,
            command: None,
            id: None,
        })
    }

    /// Wrap `err` in an error envelope.
    pub fn error(err: &Error, request: Option<&Operation>) -> Self {
        Response::Error(Failure::from_error(err, request))
    }

    /// The envelope a busy device answers with.
    pub fn busy() -> Self {
        Response::Error(Failure::new(ErrorKind::DeviceBusy))
    }

    /// Whether the operation applied.
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    /// Whether the operation failed.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// The failure kind, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Response::Error(failure) => Some(failure.error),
            Response::Success(_) => None,
        }
    }

    /// The success payload, if any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Response::Success(success) => Some(&success.data),
            Response::Error(_) => None,
        }
    }

    /// The journaled pair, if the operation committed one.
    pub fn command(&self) -> Option<&Command> {
        match self {
            Response::Success(success) => success.command.as_ref(),
            Response::Error(_) => None,
        }
    }

    /// Identifier assigned by a successful POST.
    pub fn id(&self) -> Option<&str> {
        match self {
            Response::Success(success) => success.id.as_deref(),
            Response::Error(_) => None,
        }
    }
}
