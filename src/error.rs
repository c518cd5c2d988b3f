//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` returned by every HTTP handler.
//! It centralizes how failures are presented to clients, from database issues and
//! unknown forwarding aliases to validation failures.
//!
//! `AppError` implements `actix_web::error::ResponseError` to convert application
//! errors into HTTP responses with `{ "error": ... }` JSON bodies.
//! `From` implementations for `sqlx::Error`, `validator::ValidationErrors`, the storage
//! and ingestion errors and multipart errors allow the `?` operator in handlers.

use actix_web::{error::ResponseError, HttpResponse};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

use crate::ingest::IngestError;
use crate::store::StoreError;

/// Represents all possible errors a handler can return.
///
/// Each variant corresponds to a specific type of error, carrying the message
/// shown to the client.
#[derive(Debug)]
pub enum AppError {
    /// Represents an unauthorized access attempt (HTTP 401).
    /// Typically used when authentication fails or is required but missing.
    Unauthorized(String),
    /// Represents a client-side error due to a malformed or invalid request (HTTP 400).
    BadRequest(String),
    /// Represents a situation where a requested resource was not found (HTTP 404).
    /// Also returned when a webhook targets an unknown forwarding alias.
    NotFound(String),
    /// Represents an unexpected server-side error (HTTP 500).
    InternalServerError(String),
    /// Represents an error originating from database operations (HTTP 500).
    DatabaseError(String),
    /// Represents an error due to failed input validation (HTTP 422 Unprocessable Entity).
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Unauthorized(msg) => HttpResponse::Unauthorized().json(json!({
                "error": msg
            })),
            AppError::BadRequest(msg) => HttpResponse::BadRequest().json(json!({
                "error": msg
            })),
            AppError::NotFound(msg) => HttpResponse::NotFound().json(json!({
                "error": msg
            })),
            AppError::InternalServerError(msg) => HttpResponse::InternalServerError().json(json!({
                "error": msg
            })),
            // Database errors are also presented as generic internal server errors to the client.
            AppError::DatabaseError(_) => HttpResponse::InternalServerError().json(json!({
                "error": "Database error"
            })),
            AppError::ValidationError(msg) => HttpResponse::UnprocessableEntity().json(json!({
                "error": msg
            })),
        }
    }
}

/// Converts `sqlx::Error` into `AppError`.
///
/// `sqlx::Error::RowNotFound` becomes `AppError::NotFound`; anything else is a
/// `AppError::DatabaseError`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            _ => {
                log::error!("Database error: {}", error);
                AppError::DatabaseError(error.to_string())
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> AppError {
        match error {
            StoreError::Duplicate(what) => AppError::BadRequest(format!("{} already exists", what)),
            StoreError::Database(e) => e.into(),
            StoreError::PositionsExhausted => {
                AppError::BadRequest("No position left at the end of the todo list".into())
            }
            other => {
                log::error!("Storage error: {}", other);
                AppError::InternalServerError("Storage error".into())
            }
        }
    }
}

/// Unknown aliases are reported as 404; storage faults as 500.
impl From<IngestError> for AppError {
    fn from(error: IngestError) -> AppError {
        match error {
            IngestError::UnknownAlias(_) => AppError::NotFound("User not found".into()),
            IngestError::Storage(e) => {
                log::error!("Email could not be stored: {}", e);
                AppError::InternalServerError("Email processing failed".into())
            }
        }
    }
}

/// Converts `validator::ValidationErrors` into `AppError::ValidationError`.
///
/// The detailed validation messages are preserved.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(error: actix_multipart::MultipartError) -> AppError {
        AppError::BadRequest(format!("Malformed multipart payload: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_responses() {
        let error = AppError::Unauthorized("Invalid token".into());
        assert_eq!(error.error_response().status(), 401);

        let error = AppError::BadRequest("Invalid input".into());
        assert_eq!(error.error_response().status(), 400);

        let error = AppError::NotFound("Resource not found".into());
        assert_eq!(error.error_response().status(), 404);

        let error = AppError::InternalServerError("Server error".into());
        assert_eq!(error.error_response().status(), 500);

        let error = AppError::ValidationError("title: too short".into());
        assert_eq!(error.error_response().status(), 422);
    }

    #[test]
    fn test_ingest_errors_map_to_status() {
        let error: AppError = IngestError::UnknownAlias("todo-nobody@example.com".into()).into();
        assert_eq!(error.error_response().status(), 404);

        let storage = StoreError::Unavailable("disk full".into());
        let error: AppError = IngestError::Storage(storage).into();
        assert_eq!(error.error_response().status(), 500);
    }

    #[test]
    fn test_store_errors_map_to_status() {
        let error: AppError = StoreError::Duplicate("account").into();
        assert_eq!(error.error_response().status(), 400);

        let error: AppError = StoreError::Database(sqlx::Error::RowNotFound).into();
        assert_eq!(error.error_response().status(), 404);
    }
}
