use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use crate::domain_port::CatalogStoreError;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        *code
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if err.find::<warp::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::UnsupportedMediaType>().is_some()
        || err.find::<warp::reject::InvalidHeader>().is_some()
        || err.find::<warp::reject::PayloadTooLarge>().is_some()
    {
        ApiErrorCode::InvalidRequest
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::MethodNotAllowed
    } else {
        ApiErrorCode::internal(format!("unhandled rejection: {:?}", err))
    };

    let json = warp::reply::json(&ApiResponse::<()>::err(code, code.to_string()));
    Ok(warp::reply::with_status(json, code.status()))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Request body is malformed")]
    InvalidRequest,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Token has expired")]
    Expired,
    #[error("Token has been revoked")]
    Revoked,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient role")]
    Forbidden,
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Service temporarily unavailable")]
    Unavailable,
    #[error("Catalog sync failed")]
    SyncFailed,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn unavailable<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Backend unavailable: {}", error);
        ApiErrorCode::Unavailable
    }

    pub fn status(self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::InvalidCredentials
            | ApiErrorCode::InvalidToken
            | ApiErrorCode::Expired
            | ApiErrorCode::Revoked
            | ApiErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::SyncFailed | ApiErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => ApiErrorCode::InvalidCredentials,
            AuthError::InvalidToken => ApiErrorCode::InvalidToken,
            AuthError::Expired => ApiErrorCode::Expired,
            AuthError::Revoked => ApiErrorCode::Revoked,
            AuthError::Store(e) => ApiErrorCode::unavailable(e),
            AuthError::Internal(e) => ApiErrorCode::internal(e),
        }
    }
}

impl From<AccessError> for ApiErrorCode {
    fn from(error: AccessError) -> Self {
        match error {
            AccessError::Unauthorized => ApiErrorCode::Unauthorized,
            AccessError::Forbidden { .. } => ApiErrorCode::Forbidden,
            AccessError::Unavailable(e) => ApiErrorCode::unavailable(e),
        }
    }
}

impl From<CounterError> for ApiErrorCode {
    fn from(error: CounterError) -> Self {
        match error {
            CounterError::Store(e) => ApiErrorCode::unavailable(e),
        }
    }
}

impl From<CatalogStoreError> for ApiErrorCode {
    fn from(error: CatalogStoreError) -> Self {
        match error {
            CatalogStoreError::Store(e) => ApiErrorCode::unavailable(e),
        }
    }
}
