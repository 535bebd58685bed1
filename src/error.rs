use actix_web::{http::StatusCode, ResponseError};
use log::error;
use sea_orm::{DbErr, SqlErr, TransactionError};
use thiserror::Error;

use crate::response::response_from_error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{msg}")]
    Validation { field: String, msg: String },
    #[error("{0}")]
    Fail(String),
    #[error("please login first")]
    NeedLogin,
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(String),
    #[error("system_exception")]
    System,
}

impl AppError {
    pub fn param_error(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), msg: msg.into() }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self::Fail(msg.into())
    }

    pub fn need_login() -> Self {
        Self::NeedLogin
    }

    pub fn forbidden() -> Self {
        Self::Forbidden
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn system_exception() -> Self {
        Self::System
    }

    /// Logs an unexpected store failure before hiding its details from the caller.
    pub fn db(context: &str, err: DbErr) -> Self {
        error!("{} failed: {}", context, err);
        Self::System
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Validation { .. } => 1,
            Self::Fail(_) => 2,
            Self::NeedLogin => 3,
            Self::Forbidden => 5,
            Self::NotFound(_) => 6,
            Self::System => 99,
        }
    }

    pub fn msg(&self) -> String {
        self.to_string()
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::Fail(_) => StatusCode::BAD_REQUEST,
            Self::NeedLogin => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::System => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        response_from_error(self)
    }
}

pub fn is_unique_violation(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    let msg = err.to_string();
    msg.contains("Duplicate") || msg.contains("UNIQUE")
}

pub fn map_tx_error(err: TransactionError<AppError>) -> AppError {
    match err {
        TransactionError::Connection(e) => AppError::db("transaction", e),
        TransactionError::Transaction(app) => app,
    }
}
