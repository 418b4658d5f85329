//! Shared harness: builds the full router over a temporary data directory.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use labtrack::{
    config::{AuthConfig, Config, DatabaseBackend, DatabaseConfig, ServerConfig, UploadConfig},
    create_app,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-secret";
pub const BACKENDS: [DatabaseBackend; 2] = [DatabaseBackend::Json, DatabaseBackend::Sqlite];

pub struct TestApp {
    pub router: Router,
    pub upload_dir: PathBuf,
    _dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// `name=value` part of the Set-Cookie header
    pub fn cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(header::LOCATION).and_then(|value| value.to_str().ok())
    }
}

pub fn test_config(dir: &TempDir, backend: DatabaseBackend) -> Config {
    let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseConfig {
            backend,
            sqlite_path: path("data/data.db"),
            json_path: path("data/data.json"),
        },
        auth: AuthConfig {
            admin_username: ADMIN_USER.into(),
            admin_password: Some(ADMIN_PASSWORD.into()),
            session_cookie: "labtrack_session".into(),
            session_ttl_hours: 3,
        },
        uploads: UploadConfig {
            dir: path("uploads"),
            max_bytes: 64 * 1024,
        },
    }
}

pub async fn spawn_app(backend: DatabaseBackend) -> TestApp {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = test_config(&dir, backend);
    let upload_dir = PathBuf::from(&config.uploads.dir);
    let router = create_app(config).await.expect("app builds");
    TestApp {
        router,
        upload_dir,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.expect("request handled");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable")
            .to_vec();
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn json(&self, method: Method, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn login(&self, username: &str, password: &str) -> TestResponse {
        self.json(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": username, "password": password }),
        )
        .await
    }

    /// Session cookie for the configured administrator
    pub async fn admin_cookie(&self) -> String {
        let response = self.login(ADMIN_USER, ADMIN_PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK);
        response.cookie().expect("login sets a cookie")
    }

    /// Create a record as admin and return its id
    pub async fn create(&self, cookie: &str, slug: &str, body: Value) -> i64 {
        let response = self.json(Method::POST, &format!("/api/{}", slug), Some(cookie), body).await;
        assert_eq!(response.status, StatusCode::CREATED, "create {}: {}", slug, response.text());
        response.json()["id"].as_i64().expect("id in response")
    }
}
