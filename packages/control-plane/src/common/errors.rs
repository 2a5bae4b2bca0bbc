//! The closed error taxonomy surfaced by the store and the API handlers.
//!
//! Every variant maps to exactly one HTTP status code. Handlers never swallow
//! errors; the axum layer renders them as `{"detail": ...}` bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    // Not-found errors. The store raises the outermost missing entity, so the
    // caller always learns which level of the hierarchy is absent.
    #[error("No project exists with this name")]
    ProjectDoesNotExist,
    #[error("No version with this ID exists for this project")]
    VersionDoesNotExist,
    #[error("A function with this name does not exist for this project version")]
    FunctionDoesNotExist,
    #[error("An invocation with this ID does not exist for this function")]
    InvocationDoesNotExist,
    #[error("An execution with this ID does not exist for this invocation")]
    ExecutionDoesNotExist,
    #[error("The parent invocation does not exist")]
    ParentInvocationDoesNotExist,

    // Conflicts.
    #[error("A project with this name already exists")]
    ProjectAlreadyExists,
    #[error("A version with this ID already exists for this project")]
    VersionAlreadyExists,
    #[error("A function with this name already exists for this project version")]
    FunctionAlreadyExists,
    #[error("An invocation with this ID already exists for this function")]
    InvocationAlreadyExists,
    #[error("An execution with this ID already exists for this invocation")]
    ExecutionAlreadyExists,

    // Precondition failures on execution updates.
    #[error("This execution has already started")]
    ExecutionHasAlreadyStarted,
    #[error("This execution has not yet started")]
    ExecutionHasNotStarted,
    #[error("This execution has already finished")]
    ExecutionHasAlreadyFinished,
    #[error("This execution has not yet finished")]
    ExecutionHasNotFinished,
    #[error("The project is being deleted")]
    ProjectIsBeingDeleted,

    // Request validation.
    #[error("The offset is in an invalid format")]
    OffsetIsInvalid,
    #[error("The parent function name is missing")]
    ParentFunctionNameIsMissing,
    #[error("The parent invocation ID is missing")]
    ParentInvocationIdIsMissing,
    #[error("The project name is too long")]
    ProjectNameIsTooLong,

    // Auth.
    #[error("The API key is invalid")]
    ApiKeyIsInvalid,

    // Infrastructure failures surfaced as 5xx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Provisioner error: {0}")]
    Provisioner(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ProjectDoesNotExist
            | ApiError::VersionDoesNotExist
            | ApiError::FunctionDoesNotExist
            | ApiError::InvocationDoesNotExist
            | ApiError::ExecutionDoesNotExist => StatusCode::NOT_FOUND,

            ApiError::ProjectAlreadyExists
            | ApiError::VersionAlreadyExists
            | ApiError::FunctionAlreadyExists
            | ApiError::InvocationAlreadyExists
            | ApiError::ExecutionAlreadyExists
            | ApiError::ExecutionHasAlreadyStarted
            | ApiError::ExecutionHasNotStarted
            | ApiError::ExecutionHasAlreadyFinished
            | ApiError::ExecutionHasNotFinished => StatusCode::CONFLICT,

            ApiError::ParentInvocationDoesNotExist
            | ApiError::ProjectIsBeingDeleted
            | ApiError::OffsetIsInvalid
            | ApiError::ParentFunctionNameIsMissing
            | ApiError::ParentInvocationIdIsMissing
            | ApiError::ProjectNameIsTooLong => StatusCode::BAD_REQUEST,

            ApiError::ApiKeyIsInvalid => StatusCode::FORBIDDEN,

            ApiError::Database(_) | ApiError::Provisioner(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "internal error while handling request");
        }

        let body = ErrorResponse {
            detail: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
