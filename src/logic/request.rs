use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};
use crate::logic::change_set_coordinator::SharedChangeSet;
use crate::model::ResourcePath;

/// Everything a handler needs to serve one request or batched sub-request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Verb token exactly as received
    pub verb: String,
    pub path: ResourcePath,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    /// Change set this request belongs to, when it is part of a batch change set
    pub change_set: Option<Arc<SharedChangeSet>>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(verb: &str, path: ResourcePath) -> Self {
        Self {
            verb: verb.to_string(),
            path,
            headers: HashMap::new(),
            body: None,
            change_set: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Header lookup, case-insensitive on the name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn if_match(&self) -> Option<String> {
        self.header("if-match").map(|v| v.to_string())
    }

    /// Request body as a JSON object. Missing bodies read as empty objects.
    pub fn body_object(&self) -> ApiResult<Map<String, Value>> {
        match &self.body {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(ApiError::malformed(
                "The request body must be a JSON object",
            )),
        }
    }
}

/// Result of invoking a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResponse {
    /// Rendered immediately
    Json { status: StatusCode, body: Value },
    NoContent,
    /// Staged into a change set at the given position; rendered after submission
    Staged(usize),
}

impl HandlerResponse {
    pub fn ok(body: Value) -> Self {
        HandlerResponse::Json {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn created(body: Value) -> Self {
        HandlerResponse::Json {
            status: StatusCode::CREATED,
            body,
        }
    }
}

/// An explicit, user-registered controller for one entity set or singleton.
///
/// A controller claims every request on its resource whose verb it supports;
/// the generic handlers never see those requests.
///
/// When `request.change_set` is set, a write must stage its entry there and
/// answer with [`HandlerResponse::Staged`]. Any other answer fails the
/// change set.
#[async_trait]
pub trait ResourceController: Send + Sync {
    /// Entity set or singleton this controller serves
    fn resource(&self) -> &str;

    /// Whether the controller has an action selectable for this request
    fn supports(&self, verb: &str, path: &ResourcePath) -> bool;

    async fn handle(&self, request: &RequestContext) -> ApiResult<HandlerResponse>;
}

/// Controllers by resource name
#[derive(Default, Clone)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Arc<dyn ResourceController>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, controller: Arc<dyn ResourceController>) {
        self.controllers
            .insert(controller.resource().to_string(), controller);
    }

    /// The controller for the leading entity set or singleton of `path`,
    /// if it has an action for `verb`
    pub fn find(&self, verb: &str, path: &ResourcePath) -> Option<Arc<dyn ResourceController>> {
        let resource = path.leading_resource()?;
        self.controllers
            .get(resource)
            .filter(|controller| controller.supports(verb, path))
            .cloned()
    }

    pub fn has_controller_for(&self, verb: &str, path: &ResourcePath) -> bool {
        self.find(verb, path).is_some()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PathSegment;

    struct ReadOnlyPeople;

    #[async_trait]
    impl ResourceController for ReadOnlyPeople {
        fn resource(&self) -> &str {
            "People"
        }

        fn supports(&self, verb: &str, _path: &ResourcePath) -> bool {
            verb == "GET"
        }

        async fn handle(&self, _request: &RequestContext) -> ApiResult<HandlerResponse> {
            Ok(HandlerResponse::ok(Value::from("custom")))
        }
    }

    fn people() -> ResourcePath {
        ResourcePath::new(vec![PathSegment::EntitySet("People".to_string())])
    }

    #[test]
    fn test_registry_matches_resource_and_verb() {
        let mut registry = ControllerRegistry::new();
        registry.register(Arc::new(ReadOnlyPeople));

        assert!(registry.has_controller_for("GET", &people()));
        assert!(!registry.has_controller_for("POST", &people()));
        assert!(!registry.has_controller_for("GET", &ResourcePath::root()));

        let orders = ResourcePath::new(vec![PathSegment::EntitySet("Orders".to_string())]);
        assert!(!registry.has_controller_for("GET", &orders));
    }

    #[test]
    fn test_body_object() {
        let path = people();
        let ctx = RequestContext::new("POST", path.clone());
        assert!(ctx.body_object().unwrap().is_empty());

        let ctx = RequestContext::new("POST", path).with_body(Value::from(3));
        assert!(matches!(ctx.body_object(), Err(ApiError::MalformedQuery(_))));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let ctx = RequestContext::new("PATCH", people()).with_header("If-Match", "W/\"1\"");
        assert_eq!(ctx.if_match().as_deref(), Some("W/\"1\""));
    }
}
