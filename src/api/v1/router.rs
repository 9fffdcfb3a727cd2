use super::error::*;
use super::handler;
use crate::application_port::{AccessGuard, bearer_token};
use crate::domain_model::{Identity, Role};
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, reject};

const MAX_BODY_BYTES: u64 = 16 * 1024;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let guard = server.access_guard.clone();

    // region system
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with(server.visitor_counter.clone()))
        .and_then(handler::health);

    let visits = warp::path!("stats" / "visits")
        .and(warp::get())
        .and(with(server.visitor_counter.clone()))
        .and_then(handler::visits);
    // endregion

    // region auth
    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(json_body::<handler::LoginRequest>())
        .and(with(server.auth_service.clone()))
        .and_then(handler::login);

    let refresh = warp::path!("auth" / "refresh")
        .and(warp::post())
        .and(json_body::<handler::RefreshRequest>())
        .and(with(server.auth_service.clone()))
        .and_then(handler::refresh);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(json_body::<handler::RefreshRequest>())
        .and(with(server.auth_service.clone()))
        .and_then(handler::logout);

    let logout_all = warp::path!("auth" / "logout_all")
        .and(warp::post())
        .and(with_role(guard.clone(), Role::User))
        .and(with(server.auth_service.clone()))
        .and_then(handler::logout_all);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_role(guard.clone(), Role::User))
        .and_then(handler::me);
    // endregion

    // region admin
    let sync_catalog = warp::path!("admin" / "catalog" / "sync")
        .and(warp::post())
        .and(with_role(guard.clone(), Role::Admin))
        .and(with(server.catalog_sync.clone()))
        .and(with(server.catalog_repo.clone()))
        .and_then(handler::sync_catalog);

    let stats = warp::path!("admin" / "stats")
        .and(warp::get())
        .and(with_role(guard.clone(), Role::Admin))
        .and(with(server.visitor_counter.clone()))
        .and(with(server.catalog_repo.clone()))
        .and_then(handler::stats);

    let reset_visits = warp::path!("admin" / "stats" / "visits")
        .and(warp::delete())
        .and(with_role(guard, Role::Admin))
        .and(with(server.visitor_counter.clone()))
        .and_then(handler::reset_visits);
    // endregion

    health
        .or(visits)
        .or(login)
        .or(refresh)
        .or(logout)
        .or(logout_all)
        .or(me)
        .or(sync_catalog)
        .or(stats)
        .or(reset_visits)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Resolve the bearer token into an identity holding at least `required`.
fn with_role(
    access_guard: Arc<dyn AccessGuard>,
    required: Role,
) -> impl Filter<Extract = (Identity,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(
        move |header: Option<String>| {
            let access_guard = access_guard.clone();
            async move {
                access_guard
                    .authorize(bearer_token(header.as_deref()), required)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)
            }
        },
    )
}
