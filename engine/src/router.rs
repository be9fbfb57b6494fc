//! Route table and dispatcher.
//!
//! The router holds an ordered list of `{template, handler}` pairs.
//! Dispatching an operation walks the list in registration order and runs
//! the first handler whose template matches `METHOD/resource` and that does
//! not decline. A successful mutation is turned into a reversible
//! [`Command`].

use crate::command::{Command, Method, Operation, Response, Success};
use crate::error::{Error, Result};
use crate::handlers;
use crate::resource::{resource_type, Resource};
use crate::store::ResourceStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Parameters captured by a template, e.g. `resource` and `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// A parameter the template guarantees to capture.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| Error::InvalidPayload(format!("route parameter '{name}' not captured")))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A `METHOD/segment/:param` template.
///
/// Literal segments match exactly; `:name` segments capture one non-empty
/// path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl RouteTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        for (position, part) in template.split('/').enumerate() {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }
            match part.strip_prefix(':') {
                Some("") => return Err(invalid("unnamed parameter")),
                Some(name) if position == 0 => {
                    return Err(invalid(&format!("method cannot be a parameter (':{name}')")))
                }
                Some(name) => segments.push(Segment::Param(name.to_string())),
                None => segments.push(Segment::Literal(part.to_string())),
            }
        }
        if segments.len() < 2 {
            return Err(invalid("expected METHOD/path"));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a `METHOD/path` string, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(Params(params))
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A route handler bound to whatever store the dispatch runs against.
///
/// Returning `Ok(None)` declines the operation; dispatch moves on to the
/// next matching route.
pub trait Handler: Send + Sync {
    fn handle(
        &self,
        store: &mut dyn ResourceStore,
        params: &Params,
        operation: &Operation,
    ) -> Result<Option<Value>>;
}

impl<F> Handler for F
where
    F: Fn(&mut dyn ResourceStore, &Params, &Operation) -> Result<Option<Value>> + Send + Sync,
{
    fn handle(
        &self,
        store: &mut dyn ResourceStore,
        params: &Params,
        operation: &Operation,
    ) -> Result<Option<Value>> {
        self(store, params, operation)
    }
}

#[derive(Clone)]
struct Route {
    template: RouteTemplate,
    handler: Arc<dyn Handler>,
}

/// Ordered route table.
///
/// Caller routes are kept ahead of the default CRUD routes, in the order
/// they were registered.
#[derive(Clone)]
pub struct Router {
    routes: Vec<Route>,
    custom: usize,
}

impl Router {
    /// A router with the default `POST`, `DELETE`, `PATCH` and `PUT`
    /// handlers.
    pub fn new() -> Self {
        let defaults: [(&str, Arc<dyn Handler>); 4] = [
            ("POST/:resource", Arc::new(handlers::post)),
            ("DELETE/:resource/:id", Arc::new(handlers::delete)),
            ("PATCH/:resource/:id", Arc::new(handlers::patch)),
            ("PUT/:resource/:id", Arc::new(handlers::put)),
        ];
        let routes = defaults
            .into_iter()
            .filter_map(|(template, handler)| {
                let template = RouteTemplate::parse(template).ok()?;
                Some(Route { template, handler })
            })
            .collect();
        Self { routes, custom: 0 }
    }

    /// Register a caller route ahead of the defaults.
    pub fn register(&mut self, template: &str, handler: impl Handler + 'static) -> Result<()> {
        let route = Route {
            template: RouteTemplate::parse(template)?,
            handler: Arc::new(handler),
        };
        self.routes.insert(self.custom, route);
        self.custom += 1;
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_route(mut self, template: &str, handler: impl Handler + 'static) -> Result<Self> {
        self.register(template, handler)?;
        Ok(self)
    }

    /// Templates in dispatch order.
    pub fn templates(&self) -> impl Iterator<Item = &RouteTemplate> {
        self.routes.iter().map(|route| &route.template)
    }

    /// Dispatch `operation` against `store`.
    ///
    /// Errors never escape as `Err`: they come back as error envelopes
    /// carrying the request.
    pub fn dispatch(&self, store: &mut dyn ResourceStore, operation: &Operation) -> Response {
        match self.try_dispatch(store, operation) {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(
                    path = %operation.route_path(),
                    error = %err,
                    "operation failed"
                );
                Response::error(&err, Some(operation))
            }
        }
    }

    fn try_dispatch(&self, store: &mut dyn ResourceStore, operation: &Operation) -> Result<Response> {
        let path = operation.route_path();
        let mut operation = operation.clone();

        for route in &self.routes {
            let Some(params) = route.template.matches(&path) else {
                continue;
            };
            if operation.method == Method::Post {
                assign_self_href(&*store, &mut operation)?;
            }
            let Some(data) = route.handler.handle(store, &params, &operation)? else {
                continue;
            };
            tracing::debug!(path = %path, route = %route.template, "operation dispatched");
            return build_command(operation, data).map(Response::Success);
        }

        Err(Error::NotFound {
            method: operation.method.to_string(),
            resource: operation.resource.clone(),
        })
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field(
                "routes",
                &self.routes.iter().map(|r| r.template.as_str()).collect::<Vec<_>>(),
            )
            .field("custom", &self.custom)
            .finish()
    }
}

/// Give a POST payload without a `self` link the first free identifier.
fn assign_self_href(store: &dyn ResourceStore, operation: &mut Operation) -> Result<()> {
    let payload = operation
        .payload
        .take()
        .unwrap_or_else(|| Value::Object(Default::default()));
    let mut resource = Resource::from_value(payload)?;
    if resource.self_href().is_none() {
        let key = store.first_available_key(&operation.resource)?;
        resource.set_self_href(&key);
    }
    operation.payload = Some(resource.into_value());
    Ok(())
}

/// Pair a successful mutation with its inverse.
fn build_command(operation: Operation, data: Value) -> Result<Success> {
    let (down, id) = match operation.method {
        Method::Post => {
            let id = Resource::from_value(data.clone())?
                .self_href()
                .map(str::to_string)
                .ok_or_else(|| Error::InvalidPayload("stored resource has no self link".into()))?;
            (Operation::delete(id.clone()), Some(id))
        }
        Method::Delete => (
            Operation::post(resource_type(&operation.resource), data.clone()),
            None,
        ),
        Method::Patch | Method::Put => (
            Operation::new(operation.method, operation.resource.clone(), Some(data.clone())),
            None,
        ),
        Method::Get => return Err(Error::MethodNotSupported(operation.method.to_string())),
    };

    Ok(Success {
        data,
        command: Some(Command::new(operation, down)),
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Response;
    use crate::error::ErrorKind;
    use crate::store::Overlay;
    use serde_json::json;

    #[test]
    fn template_matching() {
        let template = RouteTemplate::parse("DELETE/:resource/:id").unwrap();
        let params = template.matches("DELETE/posts/7").unwrap();
        assert_eq!(params.get("resource"), Some("posts"));
        assert_eq!(params.get("id"), Some("7"));

        assert!(template.matches("DELETE/posts").is_none());
        assert!(template.matches("PATCH/posts/7").is_none());
        assert!(template.matches("DELETE/posts/").is_none());
        assert!(template.matches("DELETE/posts/7/comments").is_none());
    }

    #[test]
    fn template_literals() {
        let template = RouteTemplate::parse("POST/posts/:id/publish").unwrap();
        assert_eq!(
            template.matches("POST/posts/3/publish").unwrap().get("id"),
            Some("3")
        );
        assert!(template.matches("POST/posts/3/archive").is_none());
    }

    #[test]
    fn invalid_templates() {
        assert!(RouteTemplate::parse("POST").is_err());
        assert!(RouteTemplate::parse("POST//x").is_err());
        assert!(RouteTemplate::parse("POST/:").is_err());
        assert!(RouteTemplate::parse(":method/x").is_err());
    }

    #[test]
    fn unmatched_operation_is_not_found() {
        let router = Router::new();
        let mut store = Overlay::empty();

        let response = router.dispatch(&mut store, &Operation::delete("posts"));
        assert_eq!(response.error_kind(), Some(ErrorKind::NotFound));

        let response = router.dispatch(&mut store, &Operation::post("posts/1/comments", json!({})));
        assert_eq!(response.error_kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn post_builds_delete_inverse() {
        let router = Router::new();
        let mut store = Overlay::empty();

        let response = router.dispatch(&mut store, &Operation::post("posts", json!({"title": "a"})));
        assert_eq!(response.id(), Some("posts/1"));

        let command = response.command().unwrap();
        assert_eq!(command.up.payload.as_ref().unwrap()["_links"]["self"]["href"], "posts/1");
        assert_eq!(command.down, Operation::delete("posts/1"));
    }

    #[test]
    fn custom_routes_take_precedence_and_may_decline() {
        let mut router = Router::new();
        router
            .register(
                "POST/:resource",
                |_: &mut dyn ResourceStore, params: &Params, _: &Operation| -> Result<Option<Value>> {
                if params.get("resource") == Some("drafts") {
                    Ok(Some(json!({"_links": {"self": {"href": "drafts/x"}}})))
                } else {
                    Ok(None)
                }
                },
            )
            .unwrap();

        let mut store = Overlay::empty();
        let drafted = router.dispatch(&mut store, &Operation::post("drafts", json!({})));
        assert_eq!(drafted.id(), Some("drafts/x"));
        assert!(!store.has_item("drafts/1").unwrap());

        let posted = router.dispatch(&mut store, &Operation::post("posts", json!({})));
        assert_eq!(posted.id(), Some("posts/1"));
        assert!(store.has_item("posts/1").unwrap());
    }

    #[test]
    fn read_routes_cannot_be_committed() {
        let router = Router::new()
            .with_route(
                "GET/:resource/:id",
                |store: &mut dyn ResourceStore, _: &Params, op: &Operation| -> Result<Option<Value>> {
                    Ok(store.get_item(&op.resource)?.map(Resource::into_value))
                },
            )
            .unwrap();
        let mut store = Overlay::empty();
        store.insert_item("posts/1", Resource::new()).unwrap();

        let response = router.dispatch(&mut store, &Operation::get("posts/1"));
        assert_eq!(response.error_kind(), Some(ErrorKind::MethodNotSupported));
        if let Response::Error(failure) = response {
            assert_eq!(failure.request, Some(Operation::get("posts/1")));
        }
    }

    #[test]
    fn registration_order_is_kept() {
        let noop = |_: &mut dyn ResourceStore, _: &Params, _: &Operation| -> Result<Option<Value>> {
            Ok(None)
        };
        let router = Router::new()
            .with_route("POST/a", noop)
            .unwrap()
            .with_route("POST/b", noop)
            .unwrap();

        let templates: Vec<_> = router.templates().map(RouteTemplate::as_str).collect();
        assert_eq!(
            templates,
            vec![
                "POST/a",
                "POST/b",
                "POST/:resource",
                "DELETE/:resource/:id",
                "PATCH/:resource/:id",
                "PUT/:resource/:id"
            ]
        );
    }
}
