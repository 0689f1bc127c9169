//! Typed errors and HTTP mapping.

use axum::http::StatusCode;
use thiserror::Error;

/// Model configuration problems, raised while resolving entity definitions.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: entity {entity} column {column}")]
    InvalidPrimaryKey { entity: String, column: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Failures reported by the backing store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unknown column '{column}' on {table}")]
    UnknownColumn { table: String, column: String },
    #[error("store state unavailable: {0}")]
    Unavailable(String),
}

/// Documentation-layer failures. Raised during exposure, never per request.
#[derive(Error, Debug)]
pub enum DocError {
    #[error("failed to parse api doc for {target}: {source}")]
    Malformed {
        target: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid path item {path}: {reason}")]
    InvalidPathItem { path: String, reason: String },
    #[error("invalid definition {name}: {reason}")]
    InvalidDefinition { name: String, reason: String },
    #[error("paths must start with a /: {0}")]
    InvalidPath(String),
}

/// Anything that aborts startup exposure.
#[derive(Error, Debug)]
pub enum ExposeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Doc(#[from] DocError),
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),
    #[error("duplicate route: {verb} {template}")]
    DuplicateRoute { template: String, verb: &'static str },
    #[error("duplicate endpoint: {0}")]
    DuplicateEndpoint(String),
}

/// Per-request errors. Every variant rolls back the unit-of-work before the response is sent.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed body, missing or invalid id, invalid method, id/body mismatch.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// Explicit status/message pair, typically raised by custom methods.
    #[error("{message}")]
    Generic { status: StatusCode, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn generic(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::Generic {
            status,
            message: message.into(),
        }
    }

    /// Status and client-facing message. Unclassified errors hide their text unless `verbose`.
    pub fn status_and_detail(&self, verbose: bool) -> (StatusCode, String) {
        match self {
            ApiError::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Generic { status, message } => (*status, message.clone()),
            ApiError::Store(StoreError::Conflict(m)) => (StatusCode::CONFLICT, m.clone()),
            other => {
                let message = if verbose {
                    other.to_string()
                } else {
                    "Unknown Error".to_string()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_errors_keep_their_status_and_message() {
        let (status, detail) = ApiError::validation("Invalid WidgetId").status_and_detail(false);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(detail, "Invalid WidgetId");

        let (status, _) = ApiError::NotFound("gone".into()).status_and_detail(false);
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, detail) =
            ApiError::generic(StatusCode::PAYMENT_REQUIRED, "pay up").status_and_detail(false);
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(detail, "pay up");
    }

    #[test]
    fn unclassified_errors_are_masked_unless_verbose() {
        let err = ApiError::Internal("socket closed".into());
        assert_eq!(
            err.status_and_detail(false),
            (StatusCode::INTERNAL_SERVER_ERROR, "Unknown Error".to_string())
        );
        assert_eq!(err.status_and_detail(true).1, "socket closed");
    }

    #[test]
    fn store_conflicts_map_to_409() {
        let err = ApiError::from(StoreError::Conflict("duplicate key".into()));
        assert_eq!(err.status_and_detail(false).0, StatusCode::CONFLICT);
    }
}
