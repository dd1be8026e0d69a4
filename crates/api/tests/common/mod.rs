#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uniadmin_api::config::ApiConfig;
use uniadmin_api::http::router_with_store;
use uniadmin_store::{MemoryStore, Store};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub struct TestApp {
    router: Router,
    pub store: MemoryStore,
}

pub fn config_kv() -> HashMap<String, String> {
    HashMap::from([
        ("UNIADMIN_STORE".to_string(), "memory".to_string()),
        (
            "UNIADMIN_JWT_SECRET".to_string(),
            "0123456789abcdef0123456789abcdef".to_string(),
        ),
        (
            "UNIADMIN_BOOTSTRAP_ADMIN_USERNAME".to_string(),
            ADMIN_USERNAME.to_string(),
        ),
        (
            "UNIADMIN_BOOTSTRAP_ADMIN_PASSWORD".to_string(),
            ADMIN_PASSWORD.to_string(),
        ),
    ])
}

pub async fn app() -> TestApp {
    app_with(config_kv()).await
}

pub async fn app_with(kv: HashMap<String, String>) -> TestApp {
    let config = ApiConfig::from_kv(&kv).expect("test config should be valid");
    let store = MemoryStore::new();
    let shared: Arc<dyn Store> = Arc::new(store.clone());
    let router = router_with_store(config, shared)
        .await
        .expect("router should build");
    TestApp { router, store }
}

impl TestApp {
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request should build"))
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::PATCH, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, Some(token), None).await
    }

    /// Full login response for `username`.
    pub async fn login(&self, username: &str, password: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/auth/login/",
                None,
                Some(serde_json::json!({"username": username, "password": password})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body
    }

    pub async fn admin_token(&self) -> String {
        let body = self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await;
        body["access"].as_str().expect("access token").to_string()
    }

    /// Registers a user with `role` through the admin-only endpoint and logs them in.
    pub async fn user_token(&self, admin: &str, username: &str, role: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/auth/register/",
                admin,
                serde_json::json!({
                    "username": username,
                    "email": format!("{}@uni.edu.vn", username),
                    "password": "student-pass",
                    "password_confirm": "student-pass",
                    "first_name": "Nguyen",
                    "last_name": "An",
                    "role": role,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        let body = self.login(username, "student-pass").await;
        body["access"].as_str().expect("access token").to_string()
    }

    pub async fn create(&self, token: &str, uri: &str, body: Value) -> i64 {
        let (status, created) = self.post(uri, token, body).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", created);
        created["id"].as_i64().expect("created id")
    }
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}
