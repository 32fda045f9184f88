//! Turns errors raised while serving a request into wire responses.
//!
//! Handlers are tried in order; the first one that returns a response
//! claims the error. Errors no handler claims are left to the host's
//! generic fault path.

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::{lookup, ApiError, Classification, ErrorKind, SerializationMode};
use crate::model::ValidationResult;

/// Body of a classified error response
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    ValidationItems(Vec<ValidationResult>),
    Details(Vec<ErrorDetail>),
    /// Bare message text, written as the entire body
    Message(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
    pub status: u16,
    /// Kind of the wrapper the error was unwrapped from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapped_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ErrorResponse {
    /// Body as JSON; a bare message becomes a JSON string
    pub fn body_json(&self) -> Value {
        match &self.body {
            ErrorBody::ValidationItems(items) => {
                serde_json::to_value(items).unwrap_or(Value::Null)
            }
            ErrorBody::Details(details) => serde_json::to_value(details).unwrap_or(Value::Null),
            ErrorBody::Message(message) => Value::String(message.clone()),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self.body {
            ErrorBody::Message(_) => "text/plain; charset=utf-8",
            _ => "application/json",
        }
    }
}

type ExceptionHandler = fn(&ApiError, bool) -> Option<ErrorResponse>;

static HANDLERS: [ExceptionHandler; 2] = [handle_change_set_validation, handle_common];

/// Status code and serialization mode for `error`, or `None` when the
/// error is not one this layer answers for.
pub fn classify(error: &ApiError) -> Option<Classification> {
    if error.kind() == ErrorKind::ChangeSetValidation {
        return lookup(ErrorKind::ChangeSetValidation).copied();
    }
    let unwrapped = unwrap_once(error);
    lookup(unwrapped.kind())
        .filter(|row| row.mode == SerializationMode::ErrorDetail)
        .copied()
}

/// Produce the response for `error`, or `None` if no handler claims it.
pub fn respond(error: &ApiError, verbose: bool) -> Option<ErrorResponse> {
    let response = HANDLERS.iter().find_map(|handler| handler(error, verbose));
    match &response {
        Some(r) => log::debug!("Error '{}' answered with {}", error, r.status),
        None => log::warn!("Unhandled {} error: {}", error.kind(), error),
    }
    response
}

/// Exactly one level: a wrapper around a wrapper stays wrapped.
fn unwrap_once(error: &ApiError) -> &ApiError {
    error.inner().unwrap_or(error)
}

fn handle_change_set_validation(error: &ApiError, _verbose: bool) -> Option<ErrorResponse> {
    let ApiError::ChangeSetValidation { results } = error else {
        return None;
    };
    let row = lookup(ErrorKind::ChangeSetValidation)?;
    Some(ErrorResponse {
        status: row.status,
        body: ErrorBody::ValidationItems(results.clone()),
    })
}

fn handle_common(error: &ApiError, verbose: bool) -> Option<ErrorResponse> {
    let row = classify(error).filter(|row| row.mode == SerializationMode::ErrorDetail)?;
    let unwrapped = unwrap_once(error);

    let body = if verbose {
        ErrorBody::Details(vec![ErrorDetail {
            kind: unwrapped.kind().to_string(),
            message: unwrapped.to_string(),
            status: row.status.as_u16(),
            wrapped_by: error.inner().map(|_| error.kind().to_string()),
        }])
    } else {
        ErrorBody::Message(unwrapped.to_string())
    };

    Some(ErrorResponse {
        status: row.status,
        body,
    })
}
