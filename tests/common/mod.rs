#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use studyhall::config::Config;
use studyhall::db;
use studyhall::email::Mailer;
use studyhall::error::{AppError, AppResult};
use studyhall::media::LocalMediaStore;
use studyhall::state::AppState;

pub const PASSWORD: &str = "correct horse battery staple";
const BOUNDARY: &str = "studyhall-test-boundary";

/// A reset email the server asked to send.
#[derive(Debug, Clone)]
pub struct SentReset {
    pub to_email: String,
    pub to_name: String,
    pub token: String,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentReset>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentReset> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_password_reset(
        &self,
        to_email: &str,
        to_name: &str,
        token: &str,
    ) -> AppResult<()> {
        if self.fail {
            return Err(AppError::Internal("smtp unavailable".into()));
        }
        self.sent.lock().unwrap().push(SentReset {
            to_email: to_email.to_string(),
            to_name: to_name.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    _dir: TempDir,
}

/// One part of a multipart/form-data body.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_mailer(RecordingMailer::default())
    }

    pub fn with_mailer(mailer: RecordingMailer) -> Self {
        Self::build(mailer, |_| {})
    }

    /// A test app whose config is adjusted after the test defaults are applied.
    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        Self::build(RecordingMailer::default(), configure)
    }

    fn build(mailer: RecordingMailer, configure: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.database.path = Some(dir.path().join("test.db"));
        config.media.path = Some(dir.path().join("media"));
        config.auth.jwt_secret = Some("integration-test-secret".to_string());
        config.auth.bcrypt_cost = 4;
        configure(&mut config);

        let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
        db::run_migrations(&pool).expect("Failed to run migrations");

        let media = Arc::new(LocalMediaStore::new(
            config.media_path(),
            &config.media.public_url,
        ));
        let mailer = Arc::new(mailer);
        let state = AppState::new(pool, config, media, mailer.clone());
        let router = studyhall::app::router(state.clone());

        Self {
            router,
            state,
            mailer,
            _dir: dir,
        }
    }

    /// Where a media URL handed out by the app lives on disk.
    pub fn media_file(&self, url: &str) -> PathBuf {
        let public_url = self.state.config.media.public_url.trim_end_matches('/');
        let id = url
            .strip_prefix(public_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or_else(|| panic!("{} is not a media URL", url));
        self.state.config.media_path().join(id)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    pub async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                panic!("non-JSON body ({}): {}", e, String::from_utf8_lossy(&bytes))
            })
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.json(request(Method::GET, uri, token, None)).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.json(request(Method::POST, uri, token, Some(body))).await
    }

    pub async fn put_json(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.json(request(Method::PUT, uri, token, Some(body))).await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        token: Option<&str>,
        parts: &[Part<'_>],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.json(builder.body(Body::from(multipart_body(parts))).unwrap())
            .await
    }

    /// Sign up `username` with `<username>@example.com` and the shared test password.
    pub async fn signup(&self, username: &str) -> Value {
        let (status, body) = self
            .post_json(
                "/auth/signup",
                None,
                serde_json::json!({
                    "email": format!("{}@example.com", username),
                    "username": username,
                    "name": format!("{} Student", username),
                    "password": PASSWORD,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "signup failed: {}", body);
        body
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post_json(
            "/auth/login",
            None,
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Sign up and log in, returning the bearer token.
    pub async fn user_token(&self, username: &str) -> String {
        self.signup(username).await;
        let (status, body) = self
            .login(&format!("{}@example.com", username), PASSWORD)
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn upload_picture(&self, token: &str, data: &[u8]) -> (StatusCode, Value) {
        self.post_multipart(
            "/auth/profile/picture",
            Some(token),
            &[Part::File {
                name: "file",
                file_name: "me.png",
                content_type: "image/png",
                data,
            }],
        )
        .await
    }

    pub async fn create_thread(&self, token: &str, title: &str, tags: &str) -> Value {
        let (status, body) = self
            .post_multipart(
                "/posts",
                Some(token),
                &[
                    Part::Text("title", title),
                    Part::Text("content", "Body text"),
                    Part::Text("post_type", "threads"),
                    Part::Text("tags", tags),
                ],
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create post failed: {}", body);
        body
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
