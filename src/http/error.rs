//! Structured JSON error responses.
//!
//! # Responsibilities
//! - Stable code / title / message table for every error the service returns
//! - Field-level validation errors, aggregated under `10000 Fields Validation`
//! - Log the error and render it as JSON
//!
//! # Codes
//! - `400`..`500`: general HTTP errors
//! - `1XXXX`: hygiene and validation errors

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::http::response::respond_with_json;

/// Error codes with their human-readable title and message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
    FieldsValidation,
    UniqueFieldValidation,
    FieldMaxLength,
    FieldRequired,
    RouteVariableRequired,
    FieldMinValue,
    FieldInvalidValue,
    RequestPayloadMalformed,
    FieldNotMatchRegex,
    RequestTokenMalformed,
    ExpiredRequestToken,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 16] = [
        ErrorCode::BadRequest,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::InternalServerError,
        ErrorCode::FieldsValidation,
        ErrorCode::UniqueFieldValidation,
        ErrorCode::FieldMaxLength,
        ErrorCode::FieldRequired,
        ErrorCode::RouteVariableRequired,
        ErrorCode::FieldMinValue,
        ErrorCode::FieldInvalidValue,
        ErrorCode::RequestPayloadMalformed,
        ErrorCode::FieldNotMatchRegex,
        ErrorCode::RequestTokenMalformed,
        ErrorCode::ExpiredRequestToken,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "400",
            ErrorCode::Unauthorized => "401",
            ErrorCode::Forbidden => "403",
            ErrorCode::NotFound => "404",
            ErrorCode::InternalServerError => "500",
            ErrorCode::FieldsValidation => "10000",
            ErrorCode::UniqueFieldValidation => "10001",
            ErrorCode::FieldMaxLength => "10002",
            ErrorCode::FieldRequired => "10003",
            ErrorCode::RouteVariableRequired => "10004",
            ErrorCode::FieldMinValue => "10005",
            ErrorCode::FieldInvalidValue => "10006",
            ErrorCode::RequestPayloadMalformed => "10007",
            ErrorCode::FieldNotMatchRegex => "10008",
            ErrorCode::RequestTokenMalformed => "10009",
            ErrorCode::ExpiredRequestToken => "10010",
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "Bad Request",
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::Forbidden => "Forbidden",
            ErrorCode::NotFound => "Not Found",
            ErrorCode::InternalServerError => "Internal Server Error",
            ErrorCode::FieldsValidation => "Fields Validation",
            ErrorCode::UniqueFieldValidation => "Unique Field Validation",
            ErrorCode::FieldMaxLength => "Field Max Length",
            ErrorCode::FieldRequired => "Field Required",
            ErrorCode::RouteVariableRequired => "Route Variable Required",
            ErrorCode::FieldMinValue => "Field Minimum Value",
            ErrorCode::FieldInvalidValue => "Field Invalid Value",
            ErrorCode::RequestPayloadMalformed => "Payload Malformed",
            ErrorCode::FieldNotMatchRegex => "Field Not Match Regex",
            ErrorCode::RequestTokenMalformed => "Token Malformed",
            ErrorCode::ExpiredRequestToken => "Expired Token",
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "Failed to complete request due to a bad request",
            ErrorCode::Unauthorized => "The user must be authenticated",
            ErrorCode::Forbidden => "The user does not have sufficient permissions",
            ErrorCode::NotFound => "Failed to find a match for the request",
            ErrorCode::InternalServerError => {
                "Something went wrong. Please report the issue to Administrators."
            }
            ErrorCode::FieldsValidation => "Multiple fields errors",
            ErrorCode::UniqueFieldValidation => "Unique field resource already exists",
            ErrorCode::FieldMaxLength => {
                "The field length in the request is greater than maximum length"
            }
            ErrorCode::FieldRequired => "The field in the request is required",
            ErrorCode::RouteVariableRequired => "The route variable for the request is required",
            ErrorCode::FieldMinValue => "The field in the request is less than minimum value",
            ErrorCode::FieldInvalidValue => "The field in the request has an invalid value",
            ErrorCode::RequestPayloadMalformed => "The payload for the request is malformed",
            ErrorCode::FieldNotMatchRegex => {
                "The field in the request does not match regular expression format"
            }
            ErrorCode::RequestTokenMalformed => "The token for the request is malformed",
            ErrorCode::ExpiredRequestToken => "The request token has expired",
        }
    }

    /// Look up a code by its wire value.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn response_error(self) -> ResponseError {
        ResponseError {
            code: self.code().to_string(),
            title: self.title().to_string(),
            message: self.message().to_string(),
            errors: Vec::new(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}

/// Error attached to a specific request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub code: String,
    pub field: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] [{}] {}", self.code, self.field, self.message)
        }
    }
}

/// Structured error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ResponseError {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl ResponseError {
    pub fn is_fields_validation(&self) -> bool {
        self.code == ErrorCode::FieldsValidation.code()
    }

    /// Append a field error. An empty `message` takes the code's default message.
    ///
    /// Once more than one field error is present the response is re-labelled as
    /// `10000 Fields Validation`.
    pub fn add_validation_error(
        &mut self,
        code: ErrorCode,
        field: impl Into<String>,
        message: impl Into<String>,
    ) {
        let mut message = message.into();
        if message.is_empty() {
            message = code.message().to_string();
        }

        self.errors.push(FieldError {
            code: code.code().to_string(),
            field: field.into(),
            message,
        });

        if self.errors.len() > 1 {
            let fields = ErrorCode::FieldsValidation;
            self.code = fields.code().to_string();
            self.title = fields.title().to_string();
        }
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fields_validation() {
            let joined = self
                .errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            return write!(f, "[{}] {}", self.code, joined);
        }

        if self.message.is_empty() {
            write!(f, "[{}] {}", self.code, self.title)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: String,
    #[serde(flatten)]
    body: &'a ResponseError,
}

/// An error returned to the client as a JSON body.
#[derive(Debug, Clone, Error)]
#[error("{body}")]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ResponseError,
    pub cause: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode) -> Self {
        Self::from_body(status, code.response_error())
    }

    pub fn from_body(status: StatusCode, body: ResponseError) -> Self {
        Self {
            status,
            body,
            cause: None,
        }
    }

    /// Attach the underlying error; its text becomes the `error` field.
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::BadRequest)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalServerError)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.cause.clone().unwrap_or_else(|| self.body.to_string());
        tracing::error!(
            status = self.status.as_u16(),
            code = %self.body.code,
            error = %error,
            "request with error"
        );

        respond_with_json(
            self.status,
            ErrorEnvelope {
                error,
                body: &self.body,
            },
        )
    }
}
