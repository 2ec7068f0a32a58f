use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::messages;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by a ledger store driver
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported query: {0}")]
    Unsupported(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(error.to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::UniqueViolation(db_err.message().to_string())
            }
            _ => StoreError::Query(error.to_string()),
        }
    }
}

impl From<MigrateError> for StoreError {
    fn from(error: MigrateError) -> Self {
        StoreError::Unavailable(format!("Migration error: {:?}", error))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Machine readable classification of a domain failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    StoreUnavailable,
    AccountNotFound,
    DuplicateAccount,
    ReactivatedExisting,
    InvalidField,
    Unauthorized,
    DuplicateAttendance,
    NoEstimatesAvailable,
    MissingPlayerEstimate,
    AggregationFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::StoreUnavailable => "store unavailable",
            ErrorKind::AccountNotFound => "account not found",
            ErrorKind::DuplicateAccount => "duplicate account",
            ErrorKind::ReactivatedExisting => "archived account reactivated",
            ErrorKind::InvalidField => "one or more fields are invalid",
            ErrorKind::Unauthorized => "not authorized",
            ErrorKind::DuplicateAttendance => "attendance already marked for the day",
            ErrorKind::NoEstimatesAvailable => "zero play days estimated for the month",
            ErrorKind::MissingPlayerEstimate => "player has a zero or missing estimate",
            ErrorKind::AggregationFailed => "aggregation query failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from the business layer.
///
/// Carries the kind, where it happened, the lower level cause (never shown to
/// users), contextual fields for the log line and a message fit for the chat.
#[derive(Debug)]
pub struct DomainError {
    pub kind: ErrorKind,
    pub location: &'static str,
    pub cause: Option<StoreError>,
    pub user_message: String,
    pub fields: Vec<(&'static str, String)>,
}

impl DomainError {
    pub fn new(kind: ErrorKind, location: &'static str) -> Self {
        Self {
            kind,
            location,
            cause: None,
            user_message: messages::try_again(),
            fields: Vec::new(),
        }
    }

    /// Store failure outside of an aggregation
    pub fn store(location: &'static str, cause: StoreError, operation: &str) -> Self {
        let user_message = if cause.is_unavailable() {
            messages::gateway_failed()
        } else {
            messages::failed_query(operation)
        };
        Self::new(ErrorKind::StoreUnavailable, location)
            .with_cause(cause)
            .with_user_message(user_message)
    }

    /// Aggregation failure; a driver that is down still reports as unavailable
    pub fn aggregation(location: &'static str, cause: StoreError, operation: &str) -> Self {
        if cause.is_unavailable() {
            return Self::store(location, cause, operation);
        }
        Self::new(ErrorKind::AggregationFailed, location)
            .with_cause(cause)
            .with_user_message(messages::failed_query(operation))
    }

    pub fn with_cause(mut self, cause: StoreError) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    pub fn with_field(mut self, name: &'static str, value: impl ToString) -> Self {
        self.fields.push((name, value.to_string()));
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Emit the internal details at a level matching the kind
    pub fn log(&self) {
        let cause = self.cause.as_ref().map(|c| c.to_string());
        match self.kind {
            ErrorKind::StoreUnavailable | ErrorKind::AggregationFailed => error!(
                kind = %self.kind,
                location = self.location,
                cause = ?cause,
                fields = ?self.fields,
                "domain operation failed"
            ),
            ErrorKind::ReactivatedExisting => info!(
                location = self.location,
                fields = ?self.fields,
                "archived account reactivated"
            ),
            _ => warn!(
                kind = %self.kind,
                location = self.location,
                cause = ?cause,
                fields = ?self.fields,
                "domain rule rejected command"
            ),
        }
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} {}: {}", self.location, self.kind, cause),
            None => write!(f, "{} {}", self.location, self.kind),
        }
    }
}

impl std::error::Error for DomainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::Domain(de) => {
                de.log();
                let status = match de.kind {
                    ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorKind::AggregationFailed => StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorKind::AccountNotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
                    ErrorKind::DuplicateAccount | ErrorKind::DuplicateAttendance => {
                        StatusCode::CONFLICT
                    }
                    ErrorKind::ReactivatedExisting => StatusCode::OK,
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, "DOMAIN_ERROR", de.user_message.clone())
            }
            AppError::Store(e) => {
                error!("Store error on HTTP path: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_ERROR",
                    "A store error occurred".to_string(),
                )
            }
            AppError::Transport(e) => {
                error!("Transport error on HTTP path: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "TRANSPORT_ERROR",
                    "Failed to reach the chat provider".to_string(),
                )
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Transport(format!("HTTP request error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<regex::Error> for AppError {
    fn from(error: regex::Error) -> Self {
        AppError::Config(format!("Invalid command grammar: {}", error))
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Internal(format!("IO error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_never_carries_cause() {
        let err = DomainError::store(
            "RecordExpense",
            StoreError::Query("syntax error at or near WHERE".to_string()),
            "adding a new expense",
        )
        .with_field("tid", 42);

        assert_eq!(err.kind, ErrorKind::StoreUnavailable);
        assert!(!err.user_message.contains("syntax error"));
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_aggregation_failure_kinds() {
        let down = DomainError::aggregation(
            "TotalPlayDays",
            StoreError::Unavailable("connection refused".to_string()),
            "getting the total playdays",
        );
        assert!(down.is(ErrorKind::StoreUnavailable));

        let broken = DomainError::aggregation(
            "TotalPlayDays",
            StoreError::Unsupported("match after group".to_string()),
            "getting the total playdays",
        );
        assert!(broken.is(ErrorKind::AggregationFailed));
    }
}
