mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{ADMIN_PASSWORD, ADMIN_USERNAME, app, app_with, config_kv, error_code};

#[tokio::test]
async fn login_returns_token_pair_and_profile() {
    let app = app().await;
    let body = app.login(ADMIN_USERNAME, ADMIN_PASSWORD).await;

    assert!(body["access"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["refresh"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["username"], ADMIN_USERNAME);
    assert_eq!(body["user"]["role"], "ADMIN");
    assert!(body["user"]["last_login"].is_string());
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn bad_credentials_and_disabled_accounts_are_rejected() {
    let app = app().await;
    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/login/",
            None,
            Some(json!({"username": ADMIN_USERNAME, "password": "wrong-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "AUTHENTICATION_FAILED");

    let (status, unknown) = app
        .call(
            Method::POST,
            "/api/v1/auth/login/",
            None,
            Some(json!({"username": "nobody", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, body);

    let (status, body) = app
        .call(Method::POST, "/api/v1/auth/login/", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["username"].is_array());
    assert!(body["error"]["details"]["password"].is_array());

    let admin = app.admin_token().await;
    app.user_token(&admin, "giangvien", "TEACHER").await;
    let (_, me) = app
        .call(
            Method::POST,
            "/api/v1/auth/login/",
            None,
            Some(json!({"username": "giangvien", "password": "student-pass"})),
        )
        .await;
    let teacher_id = me["user"]["id"].as_i64().unwrap();
    let teacher_access = me["access"].as_str().unwrap().to_string();
    assert!(app.store.deactivate_user(teacher_id).await);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/login/",
            None,
            Some(json!({"username": "giangvien", "password": "student-pass"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "User account is disabled");

    let (status, _) = app.get("/api/v1/auth/me/", &teacher_access).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_is_admin_only_and_validates_fields() {
    let app = app().await;
    let admin = app.admin_token().await;
    let student = app.user_token(&admin, "sinhvien", "STUDENT").await;

    let (status, _) = app
        .post("/api/v1/auth/register/", &student, json!({"username": "other"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            "/api/v1/auth/register/",
            &admin,
            json!({
                "username": "sinhvien",
                "email": "not-an-email",
                "password": "abc12345",
                "password_confirm": "abc12346",
                "first_name": "Tran",
                "last_name": "Binh",
                "role": "JANITOR",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let details = &body["error"]["details"];
    for field in ["username", "email", "password_confirm", "role"] {
        assert!(details[field].is_array(), "missing error for {}: {}", field, body);
    }

    let (status, body) = app
        .post(
            "/api/v1/auth/register/",
            &admin,
            json!({
                "username": "tran.binh",
                "email": "binh@uni.edu.vn",
                "password": "abc12345",
                "password_confirm": "abc12345",
                "first_name": "Tran",
                "last_name": "Binh",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["user"]["role"], "STUDENT");
    assert_eq!(body["message"], "User created successfully");
}

#[tokio::test]
async fn refresh_issues_access_until_logout_blacklists_it() {
    let app = app().await;
    let login = app.login(ADMIN_USERNAME, ADMIN_PASSWORD).await;
    let access = login["access"].as_str().unwrap();
    let refresh = login["refresh"].as_str().unwrap();

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/refresh/",
            None,
            Some(json!({"refresh": refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let renewed = body["access"].as_str().unwrap();
    let (status, _) = app.get("/api/v1/auth/me/", renewed).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/auth/refresh/",
            None,
            Some(json!({"refresh": access})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .post("/api/v1/auth/logout/", access, json!({"refresh": refresh}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["detail"], "Logged out successfully");

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/auth/refresh/",
            None,
            Some(json!({"refresh": refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "AUTHENTICATION_FAILED");
}

#[tokio::test]
async fn logout_accepts_empty_body_and_rejects_bad_refresh() {
    let app = app().await;
    let access = app.admin_token().await;

    let (status, _) = app
        .call(Method::POST, "/api/v1/auth/logout/", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post("/api/v1/auth/logout/", &access, json!({"refresh": "nonsense"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["refresh"].is_array());

    let (status, _) = app.call(Method::POST, "/api/v1/auth/logout/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_requires_current_password() {
    let app = app().await;
    let access = app.admin_token().await;

    let (status, body) = app
        .post(
            "/api/v1/auth/change-password/",
            &access,
            json!({
                "old_password": "not-it",
                "new_password": "brand-new-pass",
                "new_password_confirm": "brand-new-pass",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["old_password"].is_array());

    let (status, body) = app
        .post(
            "/api/v1/auth/change-password/",
            &access,
            json!({
                "old_password": ADMIN_PASSWORD,
                "new_password": "brand-new-pass",
                "new_password_confirm": "brand-new-pass",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/auth/login/",
            None,
            Some(json!({"username": ADMIN_USERNAME, "password": ADMIN_PASSWORD})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    app.login(ADMIN_USERNAME, "brand-new-pass").await;
}

#[tokio::test]
async fn profile_update_clears_nullable_fields() {
    let app = app().await;
    let access = app.admin_token().await;

    let (status, body) = app
        .patch(
            "/api/v1/auth/me/",
            &access,
            json!({"first_name": "Quan", "phone_number": "0901234567"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["first_name"], "Quan");
    assert_eq!(body["phone_number"], "0901234567");

    let (status, body) = app
        .patch("/api/v1/auth/me/", &access, json!({"phone_number": null}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["phone_number"].is_null());
    assert_eq!(body["first_name"], "Quan");

    let (status, body) = app
        .patch(
            "/api/v1/auth/me/",
            &access,
            json!({"phone_number": "0123456789012345"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["phone_number"].is_array());
}

#[tokio::test]
async fn vietnamese_locale_localizes_envelopes() {
    let mut kv = config_kv();
    kv.insert("UNIADMIN_LANGUAGE".to_string(), "vi".to_string());
    let app = app_with(kv).await;

    let (status, body) = app.call(Method::GET, "/api/v1/faculties/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["error"]["message"],
        "Bạn cần đăng nhập để thực hiện thao tác này"
    );
}

#[tokio::test]
async fn health_checks_and_metrics_are_served() {
    let app = app().await;
    let (status, _) = app.call(Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.call(Method::GET, "/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["store"], true);

    let token = app.admin_token().await;
    app.get("/api/v1/faculties/", &token).await;
    let (status, body) = app.get("/metrics", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        body.as_str()
            .is_some_and(|text| text.contains("uniadmin_http_requests_total"))
    );
}
