use addrbook_core::{AddrBookError, PhoneError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// One failing input field, e.g. `loc: ["path", "phone"]`.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn phone(source: &str, error: PhoneError) -> Self {
        FieldError {
            loc: vec![source.to_string(), "phone".to_string()],
            msg: error.to_string(),
            kind: error.kind().to_string(),
        }
    }

    pub fn body(msg: impl Into<String>) -> Self {
        FieldError {
            loc: vec!["body".to_string()],
            msg: msg.into(),
            kind: "value_error.json".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<T: Serialize> {
    detail: T,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("entry not found")]
    NotFound,

    #[error("entry already exists")]
    AlreadyExists,

    #[error("store error: {0}")]
    Store(#[from] AddrBookError),
}

impl From<FieldError> for ApiError {
    fn from(error: FieldError) -> Self {
        ApiError::Validation(vec![error])
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists => StatusCode::CONFLICT,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => {
                (status, Json(ErrorBody { detail: errors })).into_response()
            }
            ApiError::Store(error) => {
                tracing::error!("address book store failure: {}", error);
                (
                    status,
                    Json(ErrorBody {
                        detail: "Internal Server Error",
                    }),
                )
                    .into_response()
            }
            ApiError::NotFound | ApiError::AlreadyExists => {
                let reason = status.canonical_reason().unwrap_or_default();
                (status, Json(ErrorBody { detail: reason })).into_response()
            }
        }
    }
}
