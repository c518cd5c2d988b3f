#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::header;
use actix_web::{test, web, App};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use todone::auth::{AuthMiddleware, AuthResponse};
use todone::blob::DiskBlobStore;
use todone::classifier::{Classification, ClassifyError, Classifier, DisabledClassifier};
use todone::config::AppSettings;
use todone::routes::{self, health};
use todone::store::MemoryStore;
use todone::AppState;

pub const TEST_JWT_SECRET: &str = "todone-integration-secret";

/// Everything a test needs: the state, the store behind it and the upload directory.
pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub uploads: TempDir,
}

impl TestContext {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        std::env::set_var("JWT_SECRET", TEST_JWT_SECRET);

        let uploads = tempfile::tempdir().unwrap();
        let blobs = DiskBlobStore::open(uploads.path()).unwrap();
        let store = Arc::new(MemoryStore::new());
        let settings = AppSettings {
            email_domain: "todone.test".to_string(),
            ..AppSettings::default()
        };
        let state = AppState::new(store.clone(), Arc::new(blobs), classifier, &settings);

        Self {
            state,
            store,
            uploads,
        }
    }

    pub fn without_model() -> Self {
        Self::new(Arc::new(DisabledClassifier))
    }

    /// Number of files in the upload directory.
    pub fn blob_count(&self) -> usize {
        std::fs::read_dir(self.uploads.path()).unwrap().count()
    }
}

pub async fn init_app(
    state: AppState,
) -> impl Service<
    actix_http::Request,
    Response = ServiceResponse<impl MessageBody>,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(routes::config),
            ),
    )
    .await
}

pub async fn register(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    email: &str,
) -> AuthResponse {
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "email": email, "password": "password123" }))
        .to_request();
    let resp = test::call_service(app, req).await;
    assert_eq!(resp.status(), 201, "registration of {} failed", email);
    test::read_body_json(resp).await
}

pub fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

/// Builds `multipart/form-data` request bodies the way inbound mail providers send them.
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: "----todone-test-boundary".to_string(),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, filename, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// The finished request, posted to the webhook.
    pub fn into_request(mut self) -> actix_http::Request {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        test::TestRequest::post()
            .uri("/api/email-webhook")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", self.boundary),
            ))
            .set_payload(self.body)
            .to_request()
    }
}

/// Classifier answering with a fixed result and counting its calls.
pub struct StubClassifier {
    answer: Option<Classification>,
    calls: AtomicUsize,
    bodies: Mutex<Vec<String>>,
}

impl StubClassifier {
    pub fn answering(classification: Classification) -> Arc<Self> {
        Arc::new(Self {
            answer: Some(classification),
            calls: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: None,
            calls: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, _subject: &str, body: &str) -> Result<Classification, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies.lock().unwrap().push(body.to_string());
        self.answer.clone().ok_or(ClassifyError::EmptyResponse)
    }
}
