use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use axum::Router;
use reqwest::StatusCode;
use serde_json::{Value, json};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const ADMIN_PASSWORD: &str = "smoke-admin-password";

fn test_db_url() -> Option<String> {
    std::env::var("UNIADMIN_TEST_DB_URL")
        .ok()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn schema_db_url(base: &str, schema: &str) -> String {
    let separator = if base.contains('?') { "&" } else { "?" };
    format!("{base}{separator}options=-csearch_path%3D{schema}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn smoke_hierarchy_lifecycle_over_postgres() {
    let Some(db_url) = test_db_url() else {
        eprintln!("skipping e2e smoke test; set UNIADMIN_TEST_DB_URL to enable");
        return;
    };

    let log_buf = init_test_tracing();
    log_buf
        .lock()
        .expect("log lock should be available")
        .clear();

    let schema = format!("uniadmin_smoke_{}", ulid::Ulid::new()).to_lowercase();
    let admin_pool = PgPool::connect(&db_url)
        .await
        .expect("db should be reachable");
    sqlx::query(&format!("CREATE SCHEMA {}", schema))
        .execute(&admin_pool)
        .await
        .expect("create schema should succeed");
    let scoped_url = schema_db_url(&db_url, &schema);

    let config = uniadmin_api::config::ApiConfig::from_kv(&HashMap::from([
        ("UNIADMIN_BIND_ADDR".to_string(), "127.0.0.1:0".to_string()),
        ("UNIADMIN_STORE".to_string(), "postgres".to_string()),
        ("UNIADMIN_DB_URL".to_string(), scoped_url.clone()),
        (
            "UNIADMIN_JWT_SECRET".to_string(),
            "smoke-secret-smoke-secret-smoke-secret".to_string(),
        ),
        (
            "UNIADMIN_BOOTSTRAP_ADMIN_USERNAME".to_string(),
            "admin".to_string(),
        ),
        (
            "UNIADMIN_BOOTSTRAP_ADMIN_PASSWORD".to_string(),
            ADMIN_PASSWORD.to_string(),
        ),
    ]))
    .expect("api config should be valid");

    let (addr, shutdown, task) = spawn_server(
        uniadmin_api::http::router(config)
            .await
            .expect("api router should init"),
    )
    .await;

    let client = reqwest::Client::new();
    wait_for_healthz(&client, addr).await;
    let base = format!("http://{}/api/v1", addr);

    let ready = client
        .get(format!("http://{}/readyz", addr))
        .send()
        .await
        .expect("readyz should respond");
    assert_eq!(ready.status(), StatusCode::OK);

    let (status, login) = call(
        client
            .post(format!("{}/auth/login/", base))
            .json(&json!({"username": "admin", "password": ADMIN_PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", login);
    let access = login["access"].as_str().expect("access token").to_string();
    let refresh = login["refresh"].as_str().expect("refresh token").to_string();

    let (status, faculty) = call(
        client
            .post(format!("{}/faculties/", base))
            .bearer_auth(&access)
            .json(&json!({"code": "cntt", "name": "Information Technology"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", faculty);
    assert_eq!(faculty["code"], "CNTT");
    let faculty_id = faculty["id"].as_i64().expect("faculty id");

    let (status, body) = call(
        client
            .post(format!("{}/faculties/", base))
            .bearer_auth(&access)
            .json(&json!({"code": "CNTT", "name": "Duplicate Faculty"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATE_CODE");

    let (status, major) = call(
        client
            .post(format!("{}/majors/", base))
            .bearer_auth(&access)
            .json(&json!({"code": "KTPM", "name": "Software Engineering", "faculty_id": faculty_id})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", major);
    let major_id = major["id"].as_i64().expect("major id");

    let (status, class) = call(
        client
            .post(format!("{}/classes/", base))
            .bearer_auth(&access)
            .json(&json!({
                "code": "KTPM2021",
                "name": "Software Engineering 2021",
                "major_id": major_id,
                "academic_year": 2021,
            })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", class);
    assert_eq!(class["faculty"]["code"], "CNTT");
    let class_id = class["id"].as_i64().expect("class id");

    let (status, page) = call(
        client
            .get(format!("{}/classes/?major__faculty={}", base, faculty_id))
            .bearer_auth(&access),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["major"]["code"], "KTPM");

    let (status, body) = call(
        client
            .delete(format!("{}/faculties/{}/", base, faculty_id))
            .bearer_auth(&access),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INTEGRITY_CONFLICT");
    assert_eq!(body["error"]["details"]["count"], 1);

    for path in [
        format!("classes/{}/", class_id),
        format!("majors/{}/", major_id),
        format!("faculties/{}/", faculty_id),
    ] {
        let response = client
            .delete(format!("{}/{}", base, path))
            .bearer_auth(&access)
            .send()
            .await
            .expect("delete should respond");
        assert_eq!(response.status(), StatusCode::NO_CONTENT, "{}", path);
    }

    let (status, _) = call(
        client
            .post(format!("{}/auth/logout/", base))
            .bearer_auth(&access)
            .json(&json!({"refresh": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        client
            .post(format!("{}/auth/refresh/", base))
            .json(&json!({"refresh": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTHENTICATION_FAILED");

    let scoped_pool = PgPool::connect(&scoped_url)
        .await
        .expect("scoped pool should connect");
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT action, model FROM audit_events ORDER BY occurred_at, event_id")
            .fetch_all(&scoped_pool)
            .await
            .expect("audit rows should be readable");
    assert_eq!(rows.len(), 6, "three creates and three deletes: {:?}", rows);
    assert_eq!(rows[0], ("CREATE".to_string(), "Faculty".to_string()));
    assert!(rows[3..].iter().all(|(action, _)| action == "DELETE"));
    scoped_pool.close().await;

    let _ = shutdown.send(());
    let _ = tokio::time::timeout(Duration::from_secs(3), task).await;

    let _ = sqlx::query(&format!("DROP SCHEMA {} CASCADE", schema))
        .execute(&admin_pool)
        .await;

    let logs = String::from_utf8(
        log_buf
            .lock()
            .expect("log lock should be available")
            .clone(),
    )
    .expect("logs should be valid utf-8");
    assert!(
        logs.contains("[AUDIT] admin | CREATE | Faculty"),
        "audit log line missing"
    );
    assert!(
        !logs.contains(ADMIN_PASSWORD),
        "password leaked into logs"
    );
    assert!(!logs.contains(&refresh), "refresh token leaked into logs");
}

async fn call(request: reqwest::RequestBuilder) -> (StatusCode, Value) {
    let response = request.send().await.expect("request should complete");
    let status = response.status();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

async fn spawn_server(
    app: Router,
) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local_addr should succeed");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    (addr, shutdown_tx, handle)
}

async fn wait_for_healthz(client: &reqwest::Client, addr: SocketAddr) {
    let url = format!("http://{}/healthz", addr);

    for _ in 0..50 {
        if let Ok(response) = client.get(&url).send().await
            && response.status().is_success()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    panic!("server did not become ready at {}", url);
}

#[derive(Clone)]
struct TestWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Write for TestWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf
            .lock()
            .expect("log lock should be available")
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn init_test_tracing() -> Arc<Mutex<Vec<u8>>> {
    static LOG_BUF: OnceLock<Arc<Mutex<Vec<u8>>>> = OnceLock::new();

    LOG_BUF
        .get_or_init(|| {
            let buf = Arc::new(Mutex::new(Vec::new()));
            let make_writer = {
                let buf = buf.clone();
                move || TestWriter { buf: buf.clone() }
            };

            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .with_ansi(false)
                .with_writer(make_writer)
                .finish();

            tracing::subscriber::set_global_default(subscriber)
                .expect("global tracing subscriber should be set once");

            buf
        })
        .clone()
}
