use std::collections::BTreeMap;

use actix_web::body::BoxBody;
use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::NaiveDateTime;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};

use crate::mail::MailError;

pub const NON_FIELD_ERRORS: &str = "non_field_errors";

pub type Result<T> = std::result::Result<T, ApiError>;

/// Validation messages keyed by the request field they refer to.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Records the error of a field check, if any.
    pub fn check(&mut self, field: &str, outcome: std::result::Result<(), String>) {
        if let Err(message) = outcome {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.0.get(field)
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("An unspecified internal error ocurred: {0}")]
    Internal(#[from] anyhow::Error),
    #[error("An unspecified internal error ocurred")]
    Blocking(#[from] BlockingError),
    #[error("Failed to deliver email: {0}")]
    Mail(#[from] MailError),
    #[error("Invalid input.")]
    Validation(FieldErrors),
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
    #[error("Authentication credentials were not provided or are invalid.")]
    Unauthorized,
    #[error("You do not have permission to perform this action.")]
    Forbidden,
    #[error("{0} not found.")]
    NotFound(&'static str),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(FieldErrors::single(field, message))
    }

    fn get_error_code(&self) -> String {
        match self {
            ApiError::Internal(_) => "IE-00500".to_string(),
            ApiError::Blocking(_) => "DE-00500".to_string(),
            ApiError::Mail(_) => "ME-00500".to_string(),
            ApiError::Validation(_) => "VE-00400".to_string(),
            ApiError::MalformedRequest(_) => "MR-00400".to_string(),
            ApiError::Unauthorized => "UA-00401".to_string(),
            ApiError::Forbidden => "FB-00403".to_string(),
            ApiError::NotFound(_) => "NF-00404".to_string(),
        }
    }
}

impl From<DieselError> for ApiError {
    fn from(value: DieselError) -> Self {
        match value {
            DieselError::NotFound => ApiError::NotFound("Object"),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                log::warn!("Unique constraint violated: {}", info.message());
                ApiError::field(NON_FIELD_ERRORS, "An object with these values already exists.")
            }
            other => ApiError::Internal(anyhow::anyhow!("{}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    pub status: u16,
    pub timestamp: NaiveDateTime,
    pub internal_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl From<&ApiError> for ErrorResponse {
    fn from(value: &ApiError) -> Self {
        let errors = match value {
            ApiError::Validation(errors) => Some(errors.clone()),
            _ => None,
        };
        Self {
            message: value.to_string(),
            status: value.status_code().as_u16(),
            timestamp: chrono::Utc::now().naive_utc(),
            internal_code: value.get_error_code(),
            errors,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        if self.status_code().is_server_error() {
            log::error!("{:?}", self);
        }
        let mut response = HttpResponse::build(self.status_code());
        if let ApiError::Unauthorized = self {
            response.insert_header(("WWW-Authenticate", "Bearer"));
        }
        response.json(ErrorResponse::from(self))
    }
}
