use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::batch_handlers::execute_batch;
use crate::api::path_parser::parse_path;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::logic::{
    create_default_conventions, respond, ChangeSetCoordinator, ControllerRegistry,
    ConventionChain, HandlerResponse, RequestContext, RouteRequest, RouteSelection,
};
use crate::model::{
    ChangeSetEntry, EntityTarget, EntryResult, PathSegment, ResourcePath, RouteAction,
    RouteEntry,
};
use crate::store::memory::ETAG_PROPERTY;
use crate::store::traits::{ScopeFactory, Store};

/// Everything the HTTP layer needs to serve requests against one store
pub struct ApiService<S: Store> {
    pub store: Arc<S>,
    pub conventions: Arc<ConventionChain>,
    pub controllers: Arc<ControllerRegistry>,
    pub coordinator: ChangeSetCoordinator,
    pub config: ApiConfig,
}

impl<S: Store + 'static> ApiService<S> {
    pub fn new(store: Arc<S>, controllers: ControllerRegistry, config: ApiConfig) -> Self {
        let controllers = Arc::new(controllers);
        let conventions = Arc::new(create_default_conventions(controllers.clone()));
        let factory: Arc<dyn ScopeFactory> = store.clone();
        Self {
            store,
            conventions,
            controllers,
            coordinator: ChangeSetCoordinator::new(factory),
            config,
        }
    }
}

pub type AppState<S> = Arc<ApiService<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Body written for errors the classifier does not answer for
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

/// Status and body for an error, through the classifier when it claims the
/// error and the generic 500 path otherwise.
pub fn render_error(error: &ApiError, verbose: bool) -> (StatusCode, Value) {
    match respond(error, verbose) {
        Some(response) => (response.status, response.body_json()),
        None => {
            log::error!("Request failed: {}", error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!(ErrorResponse::new(&error.to_string())),
            )
        }
    }
}

pub fn error_into_response(error: &ApiError, verbose: bool) -> Response {
    match render_error(error, verbose) {
        (status, Value::String(message)) => (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response(),
        (status, body) => (status, Json(body)).into_response(),
    }
}

/// Entity tag carried in a rendered entity, if any
pub fn etag_of(body: &Value) -> Option<&str> {
    body.get(ETAG_PROPERTY).and_then(Value::as_str)
}

pub fn handler_into_response(response: HandlerResponse) -> Response {
    match response {
        HandlerResponse::Json { status, body } => {
            let mut headers = HeaderMap::new();
            if let Some(etag) = etag_of(&body).and_then(|tag| HeaderValue::from_str(tag).ok()) {
                headers.insert(header::ETAG, etag);
            }
            (status, headers, Json(body)).into_response()
        }
        HandlerResponse::NoContent => StatusCode::NO_CONTENT.into_response(),
        HandlerResponse::Staged(_) => StatusCode::ACCEPTED.into_response(),
    }
}

/// Handler response for one applied change-set entry
pub fn render_entry(result: &EntryResult) -> HandlerResponse {
    match result {
        EntryResult::Created(entity) => HandlerResponse::created(entity.clone()),
        EntryResult::Updated(_) | EntryResult::Deleted => HandlerResponse::NoContent,
        EntryResult::Invoked(Some(value)) => HandlerResponse::ok(json!({ "value": value })),
        EntryResult::Invoked(None) => HandlerResponse::NoContent,
    }
}

/// Route a request through the convention chain and run whatever claims it.
pub async fn execute_request<S: Store>(
    service: &ApiService<S>,
    request: &RequestContext,
) -> ApiResult<HandlerResponse> {
    let route = RouteRequest {
        verb: &request.verb,
        path: &request.path,
    };
    let Some((convention, selection)) = service.conventions.select(&route) else {
        return Err(ApiError::not_found(format!(
            "No route serves {} {}",
            request.verb, request.path
        )));
    };
    log::debug!(
        "{} {} claimed by '{}' as {:?}",
        request.verb,
        request.path,
        convention,
        selection
    );

    match selection {
        RouteSelection::Controller(controller) => controller.handle(request).await,
        RouteSelection::Generic(entry) => run_generic(service, entry, request).await,
        RouteSelection::ServiceDocument => {
            let model = service.store.get_model().await?;
            Ok(HandlerResponse::ok(model.service_document()))
        }
        RouteSelection::MetadataDocument => {
            let model = service.store.get_model().await?;
            Ok(HandlerResponse::ok(model.metadata_document()))
        }
    }
}

async fn run_generic<S: Store>(
    service: &ApiService<S>,
    entry: &'static RouteEntry,
    request: &RequestContext,
) -> ApiResult<HandlerResponse> {
    let path = &request.path;
    let entry = match entry.action {
        RouteAction::Get => {
            let body = service.store.query(path).await?;
            return Ok(HandlerResponse::ok(body));
        }
        RouteAction::Post => ChangeSetEntry::Create {
            entity_set: creatable_set(path)?,
            entity: request.body_object()?,
        },
        RouteAction::Put | RouteAction::Patch => ChangeSetEntry::Update {
            target: entity_target(path)?,
            entity: request.body_object()?,
            replace: entry.action == RouteAction::Put,
            if_match: request.if_match(),
        },
        RouteAction::Delete => ChangeSetEntry::Delete {
            target: entity_target(path)?,
            if_match: request.if_match(),
        },
        RouteAction::PostAction => {
            let (operation, bound_to) = action_invocation(path)?;
            ChangeSetEntry::Invoke {
                operation,
                bound_to,
                parameters: request.body_object()?,
            }
        }
    };

    match &request.change_set {
        Some(change_set) => {
            let position = change_set.stage(entry);
            log::debug!(
                "Staged {} at position {} of change set '{}'",
                request.path,
                position,
                change_set.id
            );
            Ok(HandlerResponse::Staged(position))
        }
        None => {
            let result = service
                .coordinator
                .submit_single(entry, &request.cancel)
                .await?;
            Ok(render_entry(&result))
        }
    }
}

fn creatable_set(path: &ResourcePath) -> ApiResult<String> {
    match path.segments.as_slice() {
        [PathSegment::EntitySet(set)] => Ok(set.clone()),
        _ => Err(ApiError::not_implemented(format!(
            "Cannot create entities at {}",
            path
        ))),
    }
}

fn entity_target(path: &ResourcePath) -> ApiResult<EntityTarget> {
    match path.segments.as_slice() {
        [PathSegment::EntitySet(set), PathSegment::Key(key)] => Ok(EntityTarget::Keyed {
            entity_set: set.clone(),
            key: key.clone(),
        }),
        [PathSegment::Singleton(name)] => Ok(EntityTarget::Singleton(name.clone())),
        [PathSegment::EntitySet(set)] => Err(ApiError::malformed(format!(
            "Modifying '{}' requires a key",
            set
        ))),
        _ => Err(ApiError::not_implemented(format!(
            "Cannot modify {}",
            path
        ))),
    }
}

fn action_invocation(path: &ResourcePath) -> ApiResult<(String, Option<EntityTarget>)> {
    match path.segments.as_slice() {
        [PathSegment::OperationImport { name, .. }] => Ok((name.clone(), None)),
        [prefix @ .., PathSegment::Operation { name, .. }] => {
            let bound = entity_target(&ResourcePath::new(prefix.to_vec()))?;
            Ok((name.clone(), Some(bound)))
        }
        _ => Err(ApiError::not_implemented(format!(
            "No action at {}",
            path
        ))),
    }
}

/// Headers keyed by lowercased name; values that are not valid text are dropped
pub fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

fn parse_body(body: &Bytes) -> ApiResult<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::malformed(format!("Invalid JSON body: {}", e)))
}

/// Fallback handler serving every resource path below the route prefix
pub async fn dispatch<S: Store + 'static>(
    State(service): State<AppState<S>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let verbose = service.config.use_verbose_errors;

    // Cancelled when the connection goes away and this future is dropped
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match serve(&service, method, uri, headers, body, cancel).await {
        Ok(response) => response,
        Err(error) => error_into_response(&error, verbose),
    }
}

async fn serve<S: Store + 'static>(
    service: &ApiService<S>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    cancel: CancellationToken,
) -> ApiResult<Response> {
    let relative = service
        .config
        .strip_prefix(uri.path())
        .ok_or_else(|| ApiError::not_found(format!("No resource at {}", uri.path())))?;

    let model = service.store.get_model().await?;
    let path = parse_path(&model, relative)?;
    let body = parse_body(&body)?;

    if path.first() == Some(&PathSegment::Batch) {
        if method != Method::POST {
            return Err(ApiError::malformed("Batch requests must use POST"));
        }
        let payload = body.ok_or_else(|| ApiError::malformed("Batch request has no body"))?;
        let response = execute_batch(service, &model, payload, &cancel).await?;
        return Ok(Json(response).into_response());
    }

    let mut request = RequestContext::new(method.as_str(), path);
    request.headers = collect_headers(&headers);
    request.body = body;
    request.cancel = cancel;

    let response = execute_request(service, &request).await?;
    Ok(handler_into_response(response))
}
