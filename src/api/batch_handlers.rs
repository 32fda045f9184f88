//! `$batch` endpoint: independent reads run concurrently, change sets are
//! staged request by request and submitted once.

use axum::http::{header, StatusCode};
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::api::handlers::{
    etag_of, execute_request, render_entry, render_error, ApiService,
};
use crate::api::path_parser::parse_path;
use crate::error::{ApiError, ApiResult};
use crate::logic::{ChangeSetHandle, HandlerResponse, RequestContext};
use crate::model::{
    group_batch_items, BatchItem, BatchRequest, BatchResponse, BatchResponseItem, EntityModel,
    SubRequest,
};
use crate::store::traits::Store;

pub async fn execute_batch<S: Store>(
    service: &ApiService<S>,
    model: &EntityModel,
    payload: Value,
    cancel: &CancellationToken,
) -> ApiResult<BatchResponse> {
    let batch: BatchRequest = serde_json::from_value(payload)
        .map_err(|e| ApiError::malformed(format!("Invalid batch payload: {}", e)))?;

    let limit = service.config.max_batch_requests;
    if batch.requests.len() > limit {
        return Err(ApiError::malformed(format!(
            "A batch may hold at most {} requests, got {}",
            limit,
            batch.requests.len()
        )));
    }

    let items = group_batch_items(batch.requests);
    log::debug!("Executing batch with {} item(s)", items.len());

    let mut responses = Vec::new();
    let mut pending_reads: Vec<SubRequest> = Vec::new();

    for item in items {
        match item {
            BatchItem::Operation(request) if request.is_read() => pending_reads.push(request),
            BatchItem::Operation(request) => {
                flush_reads(service, model, &mut pending_reads, &mut responses, cancel).await;
                responses.push(run_operation(service, model, request, cancel).await);
            }
            BatchItem::ChangeSet { group, requests } => {
                flush_reads(service, model, &mut pending_reads, &mut responses, cancel).await;
                responses.extend(run_change_set(service, model, &group, requests, cancel).await);
            }
        }
    }
    flush_reads(service, model, &mut pending_reads, &mut responses, cancel).await;

    Ok(BatchResponse { responses })
}

/// Run the reads collected so far concurrently, appending their responses in request order
async fn flush_reads<S: Store>(
    service: &ApiService<S>,
    model: &EntityModel,
    pending: &mut Vec<SubRequest>,
    responses: &mut Vec<BatchResponseItem>,
    cancel: &CancellationToken,
) {
    if pending.is_empty() {
        return;
    }
    let reads = pending
        .drain(..)
        .map(|request| run_operation(service, model, request, cancel));
    responses.extend(join_all(reads).await);
}

/// Request URL relative to the route prefix; absolute URLs lose their origin first
fn relative_url<'a>(url: &'a str, prefix: &str) -> &'a str {
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |slash| &rest[slash..]),
        None => url,
    };
    let trimmed = prefix.trim_end_matches('/');
    match path.strip_prefix(trimmed) {
        Some(rest) if !trimmed.is_empty() && (rest.is_empty() || rest.starts_with('/')) => rest,
        _ => path,
    }
}

fn request_context(
    model: &EntityModel,
    request: &SubRequest,
    prefix: &str,
    cancel: &CancellationToken,
) -> ApiResult<RequestContext> {
    let path = parse_path(model, relative_url(&request.url, prefix))?;
    let mut context = RequestContext::new(&request.method, path);
    for (name, value) in &request.headers {
        context = context.with_header(name, value);
    }
    context.body = request.body.clone();
    context.cancel = cancel.clone();
    Ok(context)
}

fn response_item(request: &SubRequest, response: HandlerResponse) -> BatchResponseItem {
    let mut headers = HashMap::new();
    let (status, body) = match response {
        HandlerResponse::Json { status, body } => {
            headers.insert(
                header::CONTENT_TYPE.to_string(),
                "application/json".to_string(),
            );
            if let Some(etag) = etag_of(&body) {
                headers.insert(header::ETAG.to_string(), etag.to_string());
            }
            (status, Some(body))
        }
        HandlerResponse::NoContent => (StatusCode::NO_CONTENT, None),
        HandlerResponse::Staged(_) => (StatusCode::ACCEPTED, None),
    };
    BatchResponseItem {
        id: request.id.clone(),
        atomicity_group: request.atomicity_group.clone(),
        status: status.as_u16(),
        headers,
        body,
    }
}

fn error_item(
    id: &str,
    atomicity_group: Option<&str>,
    error: &ApiError,
    verbose: bool,
) -> BatchResponseItem {
    let (status, body) = render_error(error, verbose);
    let content_type = if body.is_string() {
        "text/plain; charset=utf-8"
    } else {
        "application/json"
    };
    BatchResponseItem {
        id: id.to_string(),
        atomicity_group: atomicity_group.map(|g| g.to_string()),
        status: status.as_u16(),
        headers: HashMap::from([(header::CONTENT_TYPE.to_string(), content_type.to_string())]),
        body: Some(body),
    }
}

async fn run_operation<S: Store>(
    service: &ApiService<S>,
    model: &EntityModel,
    request: SubRequest,
    cancel: &CancellationToken,
) -> BatchResponseItem {
    let result = match request_context(model, &request, &service.config.route_prefix, cancel) {
        Ok(context) => execute_request(service, &context).await,
        Err(error) => Err(error),
    };
    match result {
        Ok(response) => response_item(&request, response),
        Err(error) => error_item(
            &request.id,
            None,
            &error,
            service.config.use_verbose_errors,
        ),
    }
}

/// One response per sub-request when the change set commits, or a single
/// response carrying the group id when any part of it fails.
async fn run_change_set<S: Store>(
    service: &ApiService<S>,
    model: &EntityModel,
    group: &str,
    requests: Vec<SubRequest>,
    cancel: &CancellationToken,
) -> Vec<BatchResponseItem> {
    let verbose = service.config.use_verbose_errors;
    let coordinator = &service.coordinator;

    let handle = match coordinator.begin_change_set(group, requests).await {
        Ok(handle) => handle,
        Err(error) => return vec![error_item(group, Some(group), &error, verbose)],
    };

    let result = stage_and_submit(service, model, &handle, cancel).await;
    let items = match result {
        Ok(items) => items,
        Err(error) => {
            log::debug!("Change set '{}' failed: {}", group, error);
            vec![error_item(group, Some(group), &error, verbose)]
        }
    };

    coordinator.dispose(handle);
    items
}

async fn stage_and_submit<S: Store>(
    service: &ApiService<S>,
    model: &EntityModel,
    handle: &ChangeSetHandle,
    cancel: &CancellationToken,
) -> ApiResult<Vec<BatchResponseItem>> {
    let mut staged = Vec::with_capacity(handle.contexts().len());

    for sub in handle.contexts() {
        if sub.request.is_read() {
            return Err(ApiError::malformed(format!(
                "Request '{}' reads data and cannot be part of change set '{}'",
                sub.request.id,
                handle.id()
            )));
        }
        let mut context =
            request_context(model, &sub.request, &service.config.route_prefix, cancel)?;
        context.change_set = Some(sub.change_set().clone());
        let response = execute_request(service, &context).await?;
        if !matches!(response, HandlerResponse::Staged(_)) {
            return Err(ApiError::Internal(anyhow::anyhow!(
                "Request '{}' was handled outside change set '{}'",
                sub.request.id,
                handle.id()
            )));
        }
        staged.push(response);
    }

    let outcome = service.coordinator.submit(handle, cancel).await?;

    handle
        .contexts()
        .iter()
        .zip(staged)
        .map(|(sub, response)| {
            let response = match response {
                HandlerResponse::Staged(position) => {
                    let entry = outcome.get(position).ok_or_else(|| {
                        ApiError::Internal(anyhow::anyhow!(
                            "no result for staged entry {} of change set '{}'",
                            position,
                            handle.id()
                        ))
                    })?;
                    render_entry(entry)
                }
                other => other,
            };
            Ok(response_item(&sub.request, response))
        })
        .collect()
}
