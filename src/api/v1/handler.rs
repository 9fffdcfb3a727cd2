use super::error::*;
use crate::application_port::*;
use crate::domain_model::{DeviceId, Identity};
use crate::domain_port::CatalogRepo;
use crate::logger::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

// region system

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub visits: i64,
}

pub async fn health(
    visitor_counter: Arc<dyn VisitorCounter>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let visits = visitor_counter
        .increment()
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(HealthResponse {
        status: "ok",
        visits,
    })))
}

#[derive(Debug, Serialize)]
pub struct VisitsResponse {
    pub visits: i64,
}

pub async fn visits(
    visitor_counter: Arc<dyn VisitorCounter>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let visits = visitor_counter
        .read()
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(VisitsResponse { visits })))
}

// endregion

// region auth

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub token_type: &'static str,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

impl From<AuthTokens> for TokenResponse {
    fn from(tokens: AuthTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer",
            access_token_expires_at: tokens.access_token_expires_at,
            refresh_token_expires_at: tokens.refresh_token_expires_at,
        }
    }
}

pub async fn login(
    body: LoginRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if body.device_id.trim().is_empty() {
        return Err(reject::custom(ApiErrorCode::InvalidRequest));
    }

    let login_input = LoginInput {
        email: body.email,
        password: body.password,
        device_id: DeviceId(body.device_id),
    };
    let tokens = auth_service
        .login(login_input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(TokenResponse::from(
        tokens,
    ))))
}

pub async fn refresh(
    body: RefreshRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let tokens = auth_service
        .refresh(&body.refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(TokenResponse::from(
        tokens,
    ))))
}

pub async fn logout(
    body: RefreshRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    auth_service
        .logout(&body.refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(())))
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked: u64,
}

pub async fn logout_all(
    identity: Identity,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let revoked = auth_service
        .logout_all(identity.id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(LogoutAllResponse {
        revoked,
    })))
}

pub async fn me(identity: Identity) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(identity)))
}

// endregion

// region admin

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub report: SyncReport,
    pub total_records: Option<u64>,
}

pub async fn sync_catalog(
    identity: Identity,
    catalog_sync: Arc<dyn CatalogSync>,
    catalog_repo: Arc<dyn CatalogRepo>,
) -> Result<impl warp::Reply, warp::Rejection> {
    info!(admin = %identity.id, "catalog sync requested");

    let outcome = catalog_sync.run_full_sync().await;
    // The count is informational; a failing store already shows up in the outcome.
    let total_records = catalog_repo.count().await.ok();

    let (response, status) = match outcome {
        Ok(report) => (
            ApiResponse::ok(SyncResponse {
                report,
                total_records,
            }),
            StatusCode::OK,
        ),
        Err(e) => (
            ApiResponse {
                success: false,
                data: Some(SyncResponse {
                    report: e.report().clone(),
                    total_records,
                }),
                error: Some(ApiError {
                    code: ApiErrorCode::SyncFailed,
                    message: e.to_string(),
                }),
            },
            ApiErrorCode::SyncFailed.status(),
        ),
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&response),
        status,
    ))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub visits: i64,
    pub catalog_records: u64,
}

pub async fn stats(
    _identity: Identity,
    visitor_counter: Arc<dyn VisitorCounter>,
    catalog_repo: Arc<dyn CatalogRepo>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let visits = visitor_counter
        .read()
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    let catalog_records = catalog_repo
        .count()
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(StatsResponse {
        visits,
        catalog_records,
    })))
}

pub async fn reset_visits(
    identity: Identity,
    visitor_counter: Arc<dyn VisitorCounter>,
) -> Result<impl warp::Reply, warp::Rejection> {
    visitor_counter
        .reset()
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    info!(admin = %identity.id, "visit counter reset");

    Ok(warp::reply::json(&ApiResponse::ok(())))
}

// endregion
