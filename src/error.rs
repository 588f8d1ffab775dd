//! Error types.
//!
//! `StoreError` is what repositories return: driver failures are classified
//! here once, so nothing above the store inspects database messages.
//! `AppError` is what services and handlers return and is rendered as a JSON
//! error body with a stable `error` code.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::model::money::AmountOutOfRange;
use crate::model::payroll_run::{InvalidTransition, PeriodNotFirstOfMonth};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    /// A compare-and-set found the row in another state than expected.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store failure: {0}")]
    Unknown(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::not_found("record", ""),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateKey(db_err.message().to_string())
            }
            sqlx::Error::Database(db_err)
                if db_err.is_foreign_key_violation() || db_err.is_check_violation() =>
            {
                StoreError::ValidationFailed(db_err.message().to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Unknown(format!("corrupt row: {err}"))
            }
            _ => StoreError::Unknown(err.to_string()),
        }
    }
}

impl From<AmountOutOfRange> for StoreError {
    fn from(err: AmountOutOfRange) -> Self {
        StoreError::ValidationFailed(err.to_string())
    }
}

impl From<strum::ParseError> for StoreError {
    fn from(err: strum::ParseError) -> Self {
        StoreError::Unknown(format!("corrupt enum column: {err}"))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    DuplicateKey(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_failed",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::DuplicateKey(_) => "duplicate_key",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(msg) => AppError::DuplicateKey(msg),
            e @ StoreError::NotFound { .. } => AppError::NotFound(e.to_string()),
            StoreError::ValidationFailed(msg) => AppError::Validation(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Unknown(msg) => {
                tracing::error!(error = %msg, "Store failure");
                AppError::Internal("Internal Server Error".to_string())
            }
        }
    }
}

impl From<PeriodNotFirstOfMonth> for AppError {
    fn from(err: PeriodNotFirstOfMonth) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<AmountOutOfRange> for AppError {
    fn from(err: AmountOutOfRange) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::DuplicateKey(_) | AppError::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.code(),
            message: self.to_string(),
        })
    }
}
