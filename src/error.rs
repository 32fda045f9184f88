use axum::http::StatusCode;
use thiserror::Error;

use crate::model::ValidationResult;

/// Errors raised while routing, validating or submitting requests.
///
/// Every variant maps to exactly one [`ErrorKind`] tag; status codes are
/// looked up from [`CLASSIFICATION_TABLE`] by tag, never by inspecting the
/// message.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The data provider rejected one or more entries of a change set
    #[error("The change set failed validation with {} result(s)", .results.len())]
    ChangeSetValidation { results: Vec<ValidationResult> },

    #[error("{0}")]
    MalformedQuery(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    ResourceNotFound(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    PreconditionRequired(String),

    #[error("{0}")]
    NotImplemented(String),

    /// Wrapper produced by asynchronous or retrying call paths around the real cause
    #[error("One or more errors occurred. ({0})")]
    Aggregate(Box<ApiError>),

    #[error("The request was cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Tag identifying the kind of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ChangeSetValidation,
    MalformedQuery,
    AccessDenied,
    ResourceNotFound,
    PreconditionFailed,
    PreconditionRequired,
    NotImplemented,
    Aggregate,
    Cancelled,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ChangeSetValidation => "ChangeSetValidation",
            ErrorKind::MalformedQuery => "MalformedQuery",
            ErrorKind::AccessDenied => "AccessDenied",
            ErrorKind::ResourceNotFound => "ResourceNotFound",
            ErrorKind::PreconditionFailed => "PreconditionFailed",
            ErrorKind::PreconditionRequired => "PreconditionRequired",
            ErrorKind::NotImplemented => "NotImplemented",
            ErrorKind::Aggregate => "Aggregate",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Internal => "Internal",
        };
        write!(f, "{}", name)
    }
}

/// How the body of a classified error is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationMode {
    /// Structured array of validation results, independent of verbosity
    ValidationItems,
    /// Error detail array when verbose, bare message text otherwise
    ErrorDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub status: StatusCode,
    pub mode: SerializationMode,
}

const fn row(kind: ErrorKind, status: StatusCode, mode: SerializationMode) -> Classification {
    Classification { kind, status, mode }
}

/// Ordered error classification, walked first-match.
pub static CLASSIFICATION_TABLE: [Classification; 7] = [
    row(
        ErrorKind::ChangeSetValidation,
        StatusCode::BAD_REQUEST,
        SerializationMode::ValidationItems,
    ),
    row(
        ErrorKind::MalformedQuery,
        StatusCode::BAD_REQUEST,
        SerializationMode::ErrorDetail,
    ),
    row(
        ErrorKind::AccessDenied,
        StatusCode::FORBIDDEN,
        SerializationMode::ErrorDetail,
    ),
    row(
        ErrorKind::ResourceNotFound,
        StatusCode::NOT_FOUND,
        SerializationMode::ErrorDetail,
    ),
    row(
        ErrorKind::PreconditionFailed,
        StatusCode::PRECONDITION_FAILED,
        SerializationMode::ErrorDetail,
    ),
    row(
        ErrorKind::PreconditionRequired,
        StatusCode::PRECONDITION_REQUIRED,
        SerializationMode::ErrorDetail,
    ),
    row(
        ErrorKind::NotImplemented,
        StatusCode::NOT_IMPLEMENTED,
        SerializationMode::ErrorDetail,
    ),
];

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::ChangeSetValidation { .. } => ErrorKind::ChangeSetValidation,
            ApiError::MalformedQuery(_) => ErrorKind::MalformedQuery,
            ApiError::AccessDenied(_) => ErrorKind::AccessDenied,
            ApiError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            ApiError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            ApiError::PreconditionRequired(_) => ErrorKind::PreconditionRequired,
            ApiError::NotImplemented(_) => ErrorKind::NotImplemented,
            ApiError::Aggregate(_) => ErrorKind::Aggregate,
            ApiError::Cancelled => ErrorKind::Cancelled,
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn wrap(inner: ApiError) -> Self {
        ApiError::Aggregate(Box::new(inner))
    }

    /// The wrapped cause of an aggregate error, if any
    pub fn inner(&self) -> Option<&ApiError> {
        match self {
            ApiError::Aggregate(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::ResourceNotFound(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ApiError::MalformedQuery(message.into())
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        ApiError::NotImplemented(message.into())
    }
}

/// Looks up the table row for a kind
pub fn lookup(kind: ErrorKind) -> Option<&'static Classification> {
    CLASSIFICATION_TABLE.iter().find(|row| row.kind == kind)
}

pub type ApiResult<T> = Result<T, ApiError>;
