use moviehub::api;
use moviehub::application_impl::*;
use moviehub::application_port::*;
use moviehub::domain_model::*;
use moviehub::domain_port::*;
use moviehub::infra_memory::*;
use moviehub::server::*;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use warp::Filter;
use warp::http::StatusCode;

async fn server() -> Arc<Server> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let users = Arc::new(MemoryUserDirectory::with_fast_hasher());
    users.insert("admin@example.com", "admin-pw", Role::Admin).await.unwrap();
    users.insert("viewer@example.com", "viewer-pw", Role::User).await.unwrap();

    let codec = Arc::new(JwtHs256Codec::new(
        JwtConfig {
            issuer: "moviehub.auth".into(),
            audience: "moviehub-client".into(),
            current_key: SigningKey {
                kid: "k1".into(),
                secret: b"http-test-secret".to_vec(),
            },
            retired_keys: vec![],
        },
        clock.clone(),
    ));
    let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
        users,
        Arc::new(MemoryCredentialStore::new(clock.clone())),
        codec,
        clock.clone(),
        AuthPolicy {
            access_ttl: Duration::from_secs(900),
            refresh_ttl: Duration::from_secs(3600),
        },
    ));
    let access_guard = Arc::new(RealAccessGuard::new(
        auth_service.clone(),
        Duration::from_secs(1),
    ));

    let source = Arc::new(ScriptedCatalogSource::new(vec![vec![
        ExternalRecord {
            id: Some(496243),
            title: Some("Parasite".into()),
            vote_average: Some(8.5),
            ..Default::default()
        },
        ExternalRecord {
            id: Some(27205),
            title: Some("Inception".into()),
            vote_average: Some(8.4),
            ..Default::default()
        },
    ]]));
    let catalog_repo: Arc<dyn CatalogRepo> = Arc::new(MemoryCatalogRepo::new());
    let catalog_sync = Arc::new(RealCatalogSync::new(
        source,
        catalog_repo.clone(),
        clock,
        SyncConfig::default(),
    ));

    Arc::new(Server::from_services(Services {
        auth_service,
        access_guard,
        visitor_counter: Arc::new(RealVisitorCounter::new(
            Arc::new(MemoryCounterStore::new()),
            DEFAULT_COUNTER_NAME,
        )),
        catalog_sync,
        catalog_repo,
    }))
}

async fn call(
    server: &Arc<Server>,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let filter = warp::path("api")
        .and(warp::path("v1"))
        .and(api::v1::routes(server.clone()))
        .recover(api::v1::recover_error);

    let mut request = warp::test::request().method(method).path(path);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.reply(&filter).await;
    let json = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
    (response.status(), json)
}

async fn login(server: &Arc<Server>, email: &str, password: &str) -> Value {
    let (status, body) = call(
        server,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": password, "device_id": "test" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"].clone()
}

#[tokio::test]
async fn health_counts_visits_and_stats_only_reads() {
    let server = server().await;

    let (status, body) = call(&server, "GET", "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "status": "ok", "visits": 1 }));
    call(&server, "GET", "/api/v1/health", None, None).await;

    let (_, body) = call(&server, "GET", "/api/v1/stats/visits", None, None).await;
    assert_eq!(body["data"]["visits"], 2);
    let (_, body) = call(&server, "GET", "/api/v1/stats/visits", None, None).await;
    assert_eq!(body["data"]["visits"], 2);
}

#[tokio::test]
async fn protected_routes_need_a_valid_bearer_token() {
    let server = server().await;

    let (status, body) = call(&server, "GET", "/api/v1/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "Unauthorized");

    let (status, _) = call(&server, "GET", "/api/v1/users/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let tokens = login(&server, "viewer@example.com", "viewer-pw").await;
    let access = tokens["access_token"].as_str().unwrap();
    let (status, body) = call(&server, "GET", "/api/v1/users/me", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["role"], "USER");
}

#[tokio::test]
async fn admin_routes_reject_plain_users() {
    let server = server().await;
    let viewer = login(&server, "viewer@example.com", "viewer-pw").await;
    let admin = login(&server, "admin@example.com", "admin-pw").await;
    let viewer_access = viewer["access_token"].as_str().unwrap();
    let admin_access = admin["access_token"].as_str().unwrap();

    let (status, body) = call(
        &server,
        "POST",
        "/api/v1/admin/catalog/sync",
        Some(viewer_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "Forbidden");

    let (status, body) = call(
        &server,
        "POST",
        "/api/v1/admin/catalog/sync",
        Some(admin_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["report"]["records_inserted"], 2);
    assert_eq!(body["data"]["total_records"], 2);

    call(&server, "GET", "/api/v1/health", None, None).await;
    let (status, body) =
        call(&server, "GET", "/api/v1/admin/stats", Some(admin_access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "visits": 1, "catalog_records": 2 }));

    let (status, _) = call(
        &server,
        "DELETE",
        "/api/v1/admin/stats/visits",
        Some(viewer_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(
        &server,
        "DELETE",
        "/api/v1/admin/stats/visits",
        Some(admin_access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&server, "GET", "/api/v1/stats/visits", None, None).await;
    assert_eq!(body["data"]["visits"], 0);
}

#[tokio::test]
async fn refresh_rotates_and_replay_is_revoked() {
    let server = server().await;
    let tokens = login(&server, "viewer@example.com", "viewer-pw").await;
    let original = tokens["refresh_token"].as_str().unwrap();

    let (status, body) = call(
        &server,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": original })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["data"]["refresh_token"], original);
    assert_eq!(body["data"]["token_type"], "Bearer");

    let (status, body) = call(
        &server,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": original })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "Revoked");
}

#[tokio::test]
async fn logout_all_reports_revoked_sessions() {
    let server = server().await;
    let tokens = login(&server, "viewer@example.com", "viewer-pw").await;
    let access = tokens["access_token"].as_str().unwrap();

    let (status, body) =
        call(&server, "POST", "/api/v1/auth/logout_all", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["revoked"], 1);

    let (status, _) = call(
        &server,
        "POST",
        "/api/v1/auth/logout",
        None,
        Some(json!({ "refresh_token": tokens["refresh_token"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bad_requests_and_unknown_paths() {
    let server = server().await;

    let (status, body) = call(
        &server,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "viewer@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "InvalidRequest");

    let (status, body) = call(
        &server,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "viewer@example.com", "password": "nope", "device_id": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "InvalidCredentials");

    let (status, _) = call(&server, "GET", "/api/v1/movies", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
