use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use std::borrow::Cow;

#[derive(Debug)]
pub enum AppError {
    InternalServerError(anyhow::Error),
    ResponseStatusError(StatusCode, Cow<'static, str>),
    /// Form-style failures, reported together.
    Invalid(Vec<String>),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct AppErrorResponse {
            status: u16,
            message: Cow<'static, str>,
        }

        #[derive(Serialize)]
        struct InvalidResponse {
            status: u16,
            messages: Vec<String>,
        }

        match self {
            AppError::InternalServerError(err) => {
                tracing::error!(error.cause_chain = ?err, error.message = %err, "unexpected error");
                AppError::from(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                    .into_response()
            }
            AppError::ResponseStatusError(code, s) => (
                code,
                Json(AppErrorResponse {
                    status: code.as_u16(),
                    message: s,
                }),
            )
                .into_response(),
            AppError::Invalid(messages) => (
                StatusCode::BAD_REQUEST,
                Json(InvalidResponse {
                    status: StatusCode::BAD_REQUEST.as_u16(),
                    messages,
                }),
            )
                .into_response(),
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> AppError {
        AppError::InternalServerError(e.into())
    }
}

impl AppError {
    pub fn from(code: StatusCode, s: impl Into<Cow<'static, str>>) -> AppError {
        AppError::ResponseStatusError(code, s.into())
    }

    pub fn not_found(what: &str) -> AppError {
        AppError::from(StatusCode::NOT_FOUND, format!("{what} not found"))
    }

    pub fn forbidden() -> AppError {
        AppError::from(
            StatusCode::FORBIDDEN,
            "You do not have permission to perform this action.",
        )
    }

    pub fn unauthorized(s: impl Into<Cow<'static, str>>) -> AppError {
        AppError::from(StatusCode::UNAUTHORIZED, s)
    }
}

/// Maps constraint violations raised by writes to client errors.
pub fn db_error(e: DieselError) -> AppError {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
            AppError::from(StatusCode::BAD_REQUEST, info.message().to_string())
        }
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            AppError::from(StatusCode::CONFLICT, "an entry with this key already exists")
        }
        e => AppError::InternalServerError(e.into()),
    }
}
