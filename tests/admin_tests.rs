use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use dcmrelay::config::Config;
use http_body_util::BodyExt;
use tower::ServiceExt;

const ADMIN_PASSWORD: &str = "bootstrap-secret";

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.server.secure_cookies = false;
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.security.bootstrap_admin_password = Some(ADMIN_PASSWORD.to_string());
    config
}

async fn spawn_app() -> Router {
    let state = dcmrelay::api::create_app_state(test_config())
        .await
        .expect("Failed to create app state");
    dcmrelay::api::router(state)
}

async fn request_json(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();
    (status, json)
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let body = serde_json::json!({ "username": username, "password": password });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK, "login as {username}");
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).to_string())
        .expect("login must set a session cookie")
}

async fn create_user(app: &Router, cookie: &str, username: &str, email: &str, role: &str) -> i64 {
    let (status, json) = request_json(
        app,
        "POST",
        "/api/admin/users",
        Some(cookie),
        Some(serde_json::json!({
            "username": username,
            "email": email,
            "password": "radiology1",
            "role": role,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "create {username}: {json}");
    json["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_create_user_enforces_uniqueness() {
    let app = spawn_app().await;
    let cookie = login(&app, "admin", ADMIN_PASSWORD).await;

    create_user(&app, &cookie, "drbrown", "drbrown@clinic.test", "medico").await;

    let (status, json) = request_json(
        &app,
        "POST",
        "/api/admin/users",
        Some(&cookie),
        Some(serde_json::json!({
            "username": "drbrown",
            "email": "other@clinic.test",
            "password": "radiology1",
            "role": "medico",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);

    let (status, _) = request_json(
        &app,
        "POST",
        "/api/admin/users",
        Some(&cookie),
        Some(serde_json::json!({
            "username": "drwhite",
            "email": "drbrown@clinic.test",
            "password": "radiology1",
            "role": "medico",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Neither conflicting attempt must have persisted anything.
    let (status, json) = request_json(&app, "GET", "/api/admin/users", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    let usernames: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(usernames.iter().filter(|u| **u == "drbrown").count(), 1);
    assert!(!usernames.contains(&"drwhite"));
}

#[tokio::test]
async fn test_create_user_rejects_short_password() {
    let app = spawn_app().await;
    let cookie = login(&app, "admin", ADMIN_PASSWORD).await;

    let (status, json) = request_json(
        &app,
        "POST",
        "/api/admin/users",
        Some(&cookie),
        Some(serde_json::json!({
            "username": "drshort",
            "email": "drshort@clinic.test",
            "password": "abc",
            "role": "medico",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("at least"));
}

#[tokio::test]
async fn test_admin_routes_forbidden_for_medico() {
    let app = spawn_app().await;
    let admin_cookie = login(&app, "admin", ADMIN_PASSWORD).await;
    create_user(&app, &admin_cookie, "drgreen", "drgreen@clinic.test", "medico").await;
    let cookie = login(&app, "drgreen", "radiology1").await;

    // Well-formed payloads so the role check is what rejects, not deserialization.
    let checks = [
        ("GET", "/api/admin/users".to_string(), None),
        (
            "POST",
            "/api/admin/users".to_string(),
            Some(serde_json::json!({
                "username": "intruder",
                "email": "intruder@clinic.test",
                "password": "radiology1",
                "role": "admin",
            })),
        ),
        (
            "PUT",
            "/api/admin/users/1".to_string(),
            Some(serde_json::json!({
                "email": "intruder@clinic.test",
                "active": true,
                "role": "admin",
            })),
        ),
        (
            "POST",
            "/api/admin/users/1/password".to_string(),
            Some(serde_json::json!({
                "new_password": "radiology1",
                "confirm_password": "radiology1",
            })),
        ),
        ("GET", "/api/admin/logs".to_string(), None),
    ];
    for (method, uri, body) in checks {
        let (status, _) = request_json(&app, method, &uri, Some(&cookie), body).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_edit_unknown_user_returns_not_found() {
    let app = spawn_app().await;
    let cookie = login(&app, "admin", ADMIN_PASSWORD).await;

    let (status, _) = request_json(
        &app,
        "PUT",
        "/api/admin/users/9999",
        Some(&cookie),
        Some(serde_json::json!({
            "email": "ghost@clinic.test",
            "active": true,
            "role": "medico",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reset_password_allows_login_with_new_one() {
    let app = spawn_app().await;
    let admin_cookie = login(&app, "admin", ADMIN_PASSWORD).await;
    let id = create_user(&app, &admin_cookie, "drgray", "drgray@clinic.test", "medico").await;

    let (status, _) = request_json(
        &app,
        "POST",
        &format!("/api/admin/users/{id}/password"),
        Some(&admin_cookie),
        Some(serde_json::json!({
            "new_password": "fresh-secret",
            "confirm_password": "does-not-match",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request_json(
        &app,
        "POST",
        &format!("/api/admin/users/{id}/password"),
        Some(&admin_cookie),
        Some(serde_json::json!({
            "new_password": "fresh-secret",
            "confirm_password": "fresh-secret",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Old password no longer works, the new one does.
    let body = serde_json::json!({ "username": "drgray", "password": "radiology1" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    login(&app, "drgray", "fresh-secret").await;
}

#[tokio::test]
async fn test_change_own_password_requires_current_one() {
    let app = spawn_app().await;
    let cookie = login(&app, "admin", ADMIN_PASSWORD).await;

    let (status, json) = request_json(
        &app,
        "PUT",
        "/api/auth/password",
        Some(&cookie),
        Some(serde_json::json!({
            "current_password": "wrong",
            "new_password": "next-secret",
            "confirm_password": "next-secret",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("incorrect"));

    let (status, _) = request_json(
        &app,
        "PUT",
        "/api/auth/password",
        Some(&cookie),
        Some(serde_json::json!({
            "current_password": ADMIN_PASSWORD,
            "new_password": "next-secret",
            "confirm_password": "next-secret",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    login(&app, "admin", "next-secret").await;
}

#[tokio::test]
async fn test_change_own_password_is_admin_gated() {
    let app = spawn_app().await;
    let admin_cookie = login(&app, "admin", ADMIN_PASSWORD).await;
    create_user(&app, &admin_cookie, "drblue", "drblue@clinic.test", "medico").await;
    let cookie = login(&app, "drblue", "radiology1").await;

    let (status, _) = request_json(
        &app,
        "PUT",
        "/api/auth/password",
        Some(&cookie),
        Some(serde_json::json!({
            "current_password": "radiology1",
            "new_password": "next-secret",
            "confirm_password": "next-secret",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The gate rejected before anything was changed.
    login(&app, "drblue", "radiology1").await;
}

#[tokio::test]
async fn test_audit_log_records_admin_actions() {
    let app = spawn_app().await;
    let cookie = login(&app, "admin", ADMIN_PASSWORD).await;
    let id = create_user(&app, &cookie, "drpink", "drpink@clinic.test", "medico").await;

    let (status, _) = request_json(
        &app,
        "PUT",
        &format!("/api/admin/users/{id}"),
        Some(&cookie),
        Some(serde_json::json!({
            "email": "drpink@clinic.test",
            "active": true,
            "role": "medico",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = request_json(&app, "GET", "/api/admin/logs", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = json["data"]["entries"].as_array().unwrap();

    let actions: Vec<&str> = entries
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert!(actions.contains(&"login"));
    assert!(actions.contains(&"create_user"));
    assert!(actions.contains(&"edit_user"));

    // Newest first, with every entry attributed to the acting admin.
    assert_eq!(entries[0]["action"], "edit_user");
    for entry in entries {
        assert_eq!(entry["username"], "admin");
    }
}

#[tokio::test]
async fn test_audit_log_filters_and_pagination() {
    let app = spawn_app().await;
    let cookie = login(&app, "admin", ADMIN_PASSWORD).await;

    // 24 creations + 1 login = 25 entries, two pages at size 20.
    for i in 0..24 {
        create_user(
            &app,
            &cookie,
            &format!("dr{i:02}"),
            &format!("dr{i:02}@clinic.test"),
            "medico",
        )
        .await;
    }

    let (status, json) = request_json(&app, "GET", "/api/admin/logs", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_items"], 25);
    assert_eq!(json["data"]["total_pages"], 2);
    assert_eq!(json["data"]["page"], 1);
    assert_eq!(json["data"]["entries"].as_array().unwrap().len(), 20);

    let (_, json) = request_json(&app, "GET", "/api/admin/logs?page=2", Some(&cookie), None).await;
    assert_eq!(json["data"]["page"], 2);
    assert_eq!(json["data"]["entries"].as_array().unwrap().len(), 5);

    // Details filter narrows down to a single creation entry.
    let (_, json) = request_json(
        &app,
        "GET",
        "/api/admin/logs?details=dr07",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(json["data"]["total_items"], 1);
    assert_eq!(
        json["data"]["entries"][0]["action"].as_str().unwrap(),
        "create_user"
    );

    // Empty filter strings behave like no filter at all.
    let (_, json) = request_json(
        &app,
        "GET",
        "/api/admin/logs?user=&details=",
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(json["data"]["total_items"], 25);
}
