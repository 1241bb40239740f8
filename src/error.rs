use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// The `{error:{type,address,description}}` payload codes from the REST
/// surface (spec §6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidJson = 2,
    MissingParameter = 5,
    ParameterNotAvailable = 6,
    InvalidValue = 7,
    TooManyItems = 11,
    ResourceNotAvailable = 3,
    ActionError = 204,
    RuleEngineFull = 101,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    ConfigError(#[from] config::ConfigError),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("resource type wrong: expected {expected} but found {found}")]
    WrongType { expected: String, found: String },

    #[error("cannot allocate any more {0}")]
    Full(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("invalid value for {address}: {description}")]
    InvalidValue { address: String, description: String },

    #[error("too many items: {0}")]
    TooManyItems(String),

    #[error("unknown parameter: {0}")]
    ParameterNotAvailable(String),

    #[error("action rejected: {0}")]
    ActionError(String),

    #[error("rule engine is full")]
    RuleEngineFull,

    #[error("request not handled by this resource")]
    NotHandled,
}

impl ApiError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::ResourceNotAvailable,
            Self::MissingParameter(_) => ErrorCode::MissingParameter,
            Self::InvalidValue { .. } => ErrorCode::InvalidValue,
            Self::TooManyItems(_) => ErrorCode::TooManyItems,
            Self::ParameterNotAvailable(_) => ErrorCode::ParameterNotAvailable,
            Self::ActionError(_) => ErrorCode::ActionError,
            Self::RuleEngineFull => ErrorCode::RuleEngineFull,
            _ => ErrorCode::InvalidJson,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Full(_) | Self::RuleEngineFull => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Render as the `{error:{...}}` envelope, addressed at `address`.
    #[must_use]
    pub fn to_payload(&self, address: &str) -> ErrorPayload {
        ErrorPayload {
            error: ErrorBody {
                typ: self.code() as u32,
                address: address.to_string(),
                description: self.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub typ: u32,
    pub address: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        log::error!("request failed: {self}");
        let status = self.status();
        let body = self.to_payload("");
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
